pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use daybreak_db::Database;
use daybreak_db::models::{AlarmRow, SelfieRow};
use daybreak_light::LightAnalyzer;
use daybreak_types::api::{
    AlarmResponse, RepeatMode, SelfieResponse, SubmitSelfieResponse, UpdateAlarmRequest,
};
use daybreak_types::error::EngineError;

use crate::storage::SelfieVault;

/// Upper bound on decode + scoring time for one submission. A degenerate
/// payload must not pin the request; timeouts surface as `InvalidImage`.
pub const DECODE_TIMEOUT: Duration = Duration::from_secs(5);

/// The single authority for alarm state transitions.
///
/// Every operation is owner-scoped: the target alarm must belong to the
/// authenticated caller, and a miss is indistinguishable from a foreign
/// alarm. Collaborators are injected; there is no ambient state.
pub struct AlarmEngine {
    db: Arc<Database>,
    vault: Arc<SelfieVault>,
    analyzer: Arc<dyn LightAnalyzer>,
}

impl AlarmEngine {
    pub fn new(db: Arc<Database>, vault: Arc<SelfieVault>, analyzer: Arc<dyn LightAnalyzer>) -> Self {
        Self { db, vault, analyzer }
    }

    pub async fn create_alarm(
        &self,
        owner_id: Uuid,
        scheduled_time: DateTime<Utc>,
        repeat: RepeatMode,
    ) -> Result<AlarmResponse, EngineError> {
        let now = Utc::now();
        if scheduled_time <= now {
            return Err(EngineError::InvalidSchedule);
        }

        let id = Uuid::new_v4();
        let row = AlarmRow {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            scheduled_time: scheduled_time.to_rfc3339(),
            repeat: repeat.as_str().to_string(),
            active: true,
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.insert_alarm(&row))
            .await
            .map_err(join_err)??;

        info!("Alarm {} created by {} for {}", id, owner_id, scheduled_time);
        Ok(AlarmResponse {
            id,
            owner_id,
            scheduled_time,
            repeat,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn list_alarms(&self, owner_id: Uuid) -> Result<Vec<AlarmResponse>, EngineError> {
        self.list(owner_id, false).await
    }

    pub async fn list_active_alarms(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<AlarmResponse>, EngineError> {
        self.list(owner_id, true).await
    }

    async fn list(
        &self,
        owner_id: Uuid,
        only_active: bool,
    ) -> Result<Vec<AlarmResponse>, EngineError> {
        let db = self.db.clone();
        let owner = owner_id.to_string();
        let rows = tokio::task::spawn_blocking(move || db.list_alarms(&owner, only_active))
            .await
            .map_err(join_err)??;
        rows.iter().map(alarm_response).collect()
    }

    /// Partial update: only provided fields change. The read-apply-write
    /// happens inside one db transaction, so a dismissal that lands
    /// concurrently is never clobbered by a patch that did not set
    /// `active`.
    pub async fn update_alarm(
        &self,
        owner_id: Uuid,
        alarm_id: Uuid,
        patch: UpdateAlarmRequest,
    ) -> Result<AlarmResponse, EngineError> {
        if let Some(t) = patch.scheduled_time {
            if t <= Utc::now() {
                return Err(EngineError::InvalidSchedule);
            }
        }

        let db = self.db.clone();
        let id = alarm_id.to_string();
        let owner = owner_id.to_string();
        let scheduled_time = patch.scheduled_time.map(|t| t.to_rfc3339());
        let repeat = patch.repeat.map(RepeatMode::as_str);
        let active = patch.active;
        let updated_at = Utc::now().to_rfc3339();

        let row = tokio::task::spawn_blocking(move || {
            db.apply_alarm_patch(
                &id,
                &owner,
                scheduled_time.as_deref(),
                repeat,
                active,
                &updated_at,
            )
        })
        .await
        .map_err(join_err)??
        .ok_or(EngineError::NotFoundOrForbidden)?;

        alarm_response(&row)
    }

    pub async fn delete_alarm(&self, owner_id: Uuid, alarm_id: Uuid) -> Result<(), EngineError> {
        self.owned_alarm(owner_id, alarm_id).await?;

        let db = self.db.clone();
        let id = alarm_id.to_string();
        tokio::task::spawn_blocking(move || db.delete_alarm(&id))
            .await
            .map_err(join_err)??;

        info!("Alarm {} deleted by {}", alarm_id, owner_id);
        Ok(())
    }

    /// The two-step dismissal flow: score the image, then record the attempt
    /// and conditionally disarm, as one transaction. Every decodable
    /// submission is recorded, approved or not; an undecodable one leaves
    /// no trace. First approved submission wins a race — the loser gets
    /// `NotActive` and nothing of it is kept.
    pub async fn submit_selfie(
        &self,
        owner_id: Uuid,
        alarm_id: Uuid,
        bytes: Vec<u8>,
    ) -> Result<SubmitSelfieResponse, EngineError> {
        let alarm = self.owned_alarm(owner_id, alarm_id).await?;
        if !alarm.active {
            return Err(EngineError::NotActive);
        }

        let bytes = Arc::new(bytes);
        let analyzer = self.analyzer.clone();
        let payload = bytes.clone();
        let reading = tokio::time::timeout(
            DECODE_TIMEOUT,
            tokio::task::spawn_blocking(move || analyzer.analyze(&payload)),
        )
        .await
        .map_err(|_| EngineError::InvalidImage("image processing timed out".into()))?
        .map_err(join_err)?
        .map_err(|e| EngineError::InvalidImage(e.to_string()))?;

        let attempt_id = Uuid::new_v4();
        let image_ref = self
            .vault
            .store(&attempt_id.to_string(), &bytes)
            .await
            .map_err(EngineError::Internal)?;

        let now = Utc::now();
        let row = SelfieRow {
            id: attempt_id.to_string(),
            alarm_id: alarm_id.to_string(),
            image_ref: image_ref.clone(),
            brightness: reading.brightness as i64,
            approved: reading.approved,
            created_at: now.to_rfc3339(),
        };

        let db = self.db.clone();
        let stored = row.clone();
        let now_str = now.to_rfc3339();
        let recorded = match tokio::task::spawn_blocking(move || db.record_attempt(&stored, &now_str))
            .await
            .map_err(join_err)
        {
            Ok(Ok(recorded)) => recorded,
            Ok(Err(e)) => {
                self.vault.remove(&image_ref).await;
                return Err(EngineError::Internal(e));
            }
            Err(e) => {
                self.vault.remove(&image_ref).await;
                return Err(e);
            }
        };

        if !recorded {
            // Lost the race: a concurrent submission disarmed the alarm
            // between our precondition check and the transaction.
            self.vault.remove(&image_ref).await;
            return Err(EngineError::NotActive);
        }

        if reading.approved {
            info!(
                "Alarm {} dismissed: brightness {} within band",
                alarm_id, reading.brightness
            );
        }

        Ok(SubmitSelfieResponse {
            attempt: SelfieResponse {
                id: attempt_id,
                alarm_id,
                image_ref,
                brightness: reading.brightness,
                approved: reading.approved,
                created_at: now,
            },
            message: reading.message,
        })
    }

    pub async fn list_selfies(
        &self,
        owner_id: Uuid,
        alarm_id: Uuid,
    ) -> Result<Vec<SelfieResponse>, EngineError> {
        self.owned_alarm(owner_id, alarm_id).await?;

        let db = self.db.clone();
        let id = alarm_id.to_string();
        let rows = tokio::task::spawn_blocking(move || db.list_selfies(&id))
            .await
            .map_err(join_err)??;
        rows.iter().map(selfie_response).collect()
    }

    /// Ownership gate for every alarm-scoped operation. A missing alarm and
    /// a foreign alarm produce the same error.
    async fn owned_alarm(&self, owner_id: Uuid, alarm_id: Uuid) -> Result<AlarmRow, EngineError> {
        let db = self.db.clone();
        let id = alarm_id.to_string();
        let row = tokio::task::spawn_blocking(move || db.get_alarm(&id))
            .await
            .map_err(join_err)??;

        match row {
            Some(row) if row.owner_id == owner_id.to_string() => Ok(row),
            _ => Err(EngineError::NotFoundOrForbidden),
        }
    }
}

fn join_err(e: tokio::task::JoinError) -> EngineError {
    EngineError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
}

fn alarm_response(row: &AlarmRow) -> Result<AlarmResponse, EngineError> {
    Ok(AlarmResponse {
        id: parse_uuid(&row.id, "alarm id")?,
        owner_id: parse_uuid(&row.owner_id, "owner id")?,
        scheduled_time: parse_time(&row.scheduled_time, &row.id),
        repeat: RepeatMode::parse(&row.repeat).unwrap_or_else(|| {
            warn!("Corrupt repeat mode '{}' on alarm '{}'", row.repeat, row.id);
            RepeatMode::Once
        }),
        active: row.active,
        created_at: parse_time(&row.created_at, &row.id),
        updated_at: parse_time(&row.updated_at, &row.id),
    })
}

fn selfie_response(row: &SelfieRow) -> Result<SelfieResponse, EngineError> {
    Ok(SelfieResponse {
        id: parse_uuid(&row.id, "selfie id")?,
        alarm_id: parse_uuid(&row.alarm_id, "alarm id")?,
        image_ref: row.image_ref.clone(),
        brightness: row.brightness.clamp(0, 255) as u8,
        approved: row.approved,
        created_at: parse_time(&row.created_at, &row.id),
    })
}

/// A corrupt stored id is an internal fault, never a fabricated nil id in
/// a response.
fn parse_uuid(s: &str, what: &str) -> Result<Uuid, EngineError> {
    s.parse().map_err(|e| {
        EngineError::Internal(anyhow::anyhow!("corrupt {} '{}': {}", what, s, e))
    })
}

fn parse_time(s: &str, record_id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on record '{}': {}", s, record_id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use daybreak_light::{AnalyzeError, LightReading, verdict};

    /// Deterministic analyzer double: first payload byte is the brightness
    /// score, an empty payload is undecodable.
    struct StubAnalyzer;

    impl LightAnalyzer for StubAnalyzer {
        fn analyze(&self, bytes: &[u8]) -> Result<LightReading, AnalyzeError> {
            let &brightness = bytes
                .first()
                .ok_or_else(|| AnalyzeError::Undecodable("empty payload".into()))?;
            let (approved, message) = verdict(brightness);
            Ok(LightReading {
                brightness,
                approved,
                message,
            })
        }
    }

    const BRIGHT: u8 = 150;
    const DARK: u8 = 20;

    async fn engine() -> (AlarmEngine, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = Uuid::new_v4();
        db.create_user(&owner.to_string(), "tester", "hash").unwrap();

        let dir = std::env::temp_dir().join(format!("daybreak-vault-{}", Uuid::new_v4()));
        let vault = Arc::new(SelfieVault::new(dir).await.unwrap());

        (AlarmEngine::new(db, vault, Arc::new(StubAnalyzer)), owner)
    }

    fn in_one_hour() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::hours(1)
    }

    async fn armed_alarm(engine: &AlarmEngine, owner: Uuid) -> Uuid {
        engine
            .create_alarm(owner, in_one_hour(), RepeatMode::Once)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_rejects_past_time() {
        let (engine, owner) = engine().await;
        let err = engine
            .create_alarm(owner, Utc::now() - ChronoDuration::seconds(1), RepeatMode::Once)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule));
    }

    #[tokio::test]
    async fn create_arms_the_alarm() {
        let (engine, owner) = engine().await;
        let alarm = engine
            .create_alarm(owner, in_one_hour(), RepeatMode::Daily)
            .await
            .unwrap();
        assert!(alarm.active);
        assert_eq!(alarm.repeat, RepeatMode::Daily);
        assert_eq!(alarm.owner_id, owner);
    }

    #[tokio::test]
    async fn listing_separates_active_from_all() {
        let (engine, owner) = engine().await;
        let first = armed_alarm(&engine, owner).await;
        let second = armed_alarm(&engine, owner).await;
        engine
            .update_alarm(
                owner,
                second,
                UpdateAlarmRequest {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(engine.list_alarms(owner).await.unwrap().len(), 2);
        let active = engine.list_active_alarms(owner).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first);
    }

    #[tokio::test]
    async fn update_applies_only_provided_fields() {
        let (engine, owner) = engine().await;
        let created = engine
            .create_alarm(owner, in_one_hour(), RepeatMode::Once)
            .await
            .unwrap();

        let updated = engine
            .update_alarm(
                owner,
                created.id,
                UpdateAlarmRequest {
                    repeat: Some(RepeatMode::Weekly),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.repeat, RepeatMode::Weekly);
        assert_eq!(updated.scheduled_time, created.scheduled_time);
        assert!(updated.active);
    }

    #[tokio::test]
    async fn update_rejects_past_time() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;
        let err = engine
            .update_alarm(
                owner,
                alarm_id,
                UpdateAlarmRequest {
                    scheduled_time: Some(Utc::now() - ChronoDuration::seconds(1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSchedule));
    }

    #[tokio::test]
    async fn foreign_alarm_is_indistinguishable_from_missing() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;
        let stranger = Uuid::new_v4();

        let err = engine
            .update_alarm(stranger, alarm_id, UpdateAlarmRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFoundOrForbidden));

        let err = engine.delete_alarm(stranger, alarm_id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFoundOrForbidden));

        let err = engine
            .submit_selfie(stranger, alarm_id, vec![BRIGHT])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFoundOrForbidden));

        let err = engine
            .delete_alarm(owner, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFoundOrForbidden));
    }

    #[tokio::test]
    async fn approved_selfie_dismisses_and_is_terminal() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;

        let outcome = engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap();
        assert!(outcome.attempt.approved);
        assert_eq!(outcome.attempt.brightness, BRIGHT);

        let alarms = engine.list_alarms(owner).await.unwrap();
        assert!(!alarms[0].active);

        let err = engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotActive));
    }

    #[tokio::test]
    async fn rejected_selfie_leaves_alarm_armed_for_retry() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;

        let outcome = engine
            .submit_selfie(owner, alarm_id, vec![DARK])
            .await
            .unwrap();
        assert!(!outcome.attempt.approved);
        assert!(outcome.message.contains("too dark"));

        // Still armed: a retry goes through and dismisses.
        let outcome = engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap();
        assert!(outcome.attempt.approved);

        let attempts = engine.list_selfies(owner, alarm_id).await.unwrap();
        assert_eq!(attempts.len(), 2);
    }

    #[tokio::test]
    async fn undecodable_blob_leaves_no_trace() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;

        let err = engine
            .submit_selfie(owner, alarm_id, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));

        assert!(engine.list_selfies(owner, alarm_id).await.unwrap().is_empty());
        assert!(engine.list_alarms(owner).await.unwrap()[0].active);
    }

    #[tokio::test]
    async fn disarmed_alarm_rejects_submissions() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;
        engine
            .update_alarm(
                owner,
                alarm_id,
                UpdateAlarmRequest {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotActive));
    }

    #[tokio::test]
    async fn explicit_rearm_reopens_dismissal() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;
        engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap();

        engine
            .update_alarm(
                owner,
                alarm_id,
                UpdateAlarmRequest {
                    active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let outcome = engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap();
        assert!(outcome.attempt.approved);
    }

    #[tokio::test]
    async fn patch_without_active_leaves_dismissal_in_place() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;
        engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap();

        let updated = engine
            .update_alarm(
                owner,
                alarm_id,
                UpdateAlarmRequest {
                    repeat: Some(RepeatMode::Weekly),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.repeat, RepeatMode::Weekly);
        assert!(!updated.active, "repeat-only patch re-armed a dismissed alarm");

        let err = engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotActive));
    }

    #[tokio::test]
    async fn corrupt_stored_id_surfaces_internal_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = Uuid::new_v4();
        db.create_user(&owner.to_string(), "tester", "hash").unwrap();
        db.insert_alarm(&AlarmRow {
            id: "not-a-uuid".into(),
            owner_id: owner.to_string(),
            scheduled_time: "2030-01-01T07:00:00+00:00".into(),
            repeat: "once".into(),
            active: true,
            created_at: "2030-01-01T00:00:00+00:00".into(),
            updated_at: "2030-01-01T00:00:00+00:00".into(),
        })
        .unwrap();

        let dir = std::env::temp_dir().join(format!("daybreak-vault-{}", Uuid::new_v4()));
        let vault = Arc::new(SelfieVault::new(dir).await.unwrap());
        let engine = AlarmEngine::new(db, vault, Arc::new(StubAnalyzer));

        let err = engine.list_alarms(owner).await.unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }

    #[tokio::test]
    async fn concurrent_approved_submissions_flip_exactly_once() {
        let (engine, owner) = engine().await;
        let engine = Arc::new(engine);
        let alarm_id = armed_alarm(&engine, owner).await;

        let a = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit_selfie(owner, alarm_id, vec![BRIGHT]).await })
        };
        let b = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.submit_selfie(owner, alarm_id, vec![BRIGHT]).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let losses = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::NotActive)))
            .count();
        assert_eq!((wins, losses), (1, 1));

        // Exactly one attempt recorded, and the alarm is off.
        let attempts = engine.list_selfies(owner, alarm_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert!(!engine.list_alarms(owner).await.unwrap()[0].active);
    }

    #[tokio::test]
    async fn attempts_listed_newest_first_with_verdicts() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;

        let first = engine
            .submit_selfie(owner, alarm_id, vec![DARK])
            .await
            .unwrap();
        let second = engine
            .submit_selfie(owner, alarm_id, vec![BRIGHT])
            .await
            .unwrap();

        let attempts = engine.list_selfies(owner, alarm_id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].id, second.attempt.id);
        assert_eq!(attempts[1].id, first.attempt.id);
        assert!(attempts[0].approved);
        assert!(!attempts[1].approved);
    }

    #[tokio::test]
    async fn submitted_image_bytes_land_in_the_vault() {
        let (engine, owner) = engine().await;
        let alarm_id = armed_alarm(&engine, owner).await;

        let outcome = engine
            .submit_selfie(owner, alarm_id, vec![DARK, 1, 2, 3])
            .await
            .unwrap();
        let stored = tokio::fs::read(&outcome.attempt.image_ref).await.unwrap();
        assert_eq!(stored, vec![DARK, 1, 2, 3]);
    }
}
