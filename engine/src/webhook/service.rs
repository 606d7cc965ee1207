use super::canonical::canonicalize_url;
use super::validate::validate_webhook_url;
use common::interface::{HumanVerifier, WebhookStore};
use common::model::entity::webhook;
use delivery::{Deliverer, DeliveryOutcome, FailureKind};
use errors::ValidationError;
use log::{info, warn};
use std::sync::Arc;

/// Registration failures, ordered by the §7 taxonomy. The API layer maps
/// these onto status codes; everything unrecognized lands in `Internal`
/// with the original message preserved.
#[derive(Debug)]
pub enum RegistrationError {
    Validation(ValidationError),
    VerificationFailed,
    Duplicate,
    QuotaExceeded { limit: u64 },
    TestFailed { kind: FailureKind, message: String },
    Internal(errors::Error),
}

impl From<ValidationError> for RegistrationError {
    fn from(err: ValidationError) -> Self {
        RegistrationError::Validation(err)
    }
}

/// Subscriber intake: structural validation, human verification, quota and
/// duplicate checks, then a live test delivery before the endpoint is
/// stored (or revived).
pub struct RegistrationService {
    store: Arc<dyn WebhookStore>,
    verifier: Arc<dyn HumanVerifier>,
    client: Arc<dyn Deliverer>,
    max_active: u64,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        verifier: Arc<dyn HumanVerifier>,
        client: Arc<dyn Deliverer>,
        max_active: u64,
    ) -> Self {
        Self {
            store,
            verifier,
            client,
            max_active,
        }
    }

    pub async fn register(
        &self,
        raw_url: &str,
        token: Option<&str>,
    ) -> Result<(webhook::Model, DeliveryOutcome), RegistrationError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(RegistrationError::Validation(ValidationError::MissingToken))?;

        validate_webhook_url(raw_url)?;

        match self.verifier.verify(token).await {
            Ok(true) => {}
            Ok(false) => return Err(RegistrationError::VerificationFailed),
            Err(e) => return Err(RegistrationError::Internal(e)),
        }

        let canonical = canonicalize_url(raw_url);

        let existing = self
            .store
            .find_by_url(&canonical)
            .await
            .map_err(RegistrationError::Internal)?;
        if existing.map(|row| row.is_active).unwrap_or(false) {
            return Err(RegistrationError::Duplicate);
        }

        let active = self
            .store
            .count_active()
            .await
            .map_err(RegistrationError::Internal)?;
        if active >= self.max_active {
            return Err(RegistrationError::QuotaExceeded {
                limit: self.max_active,
            });
        }

        let outcome = self.client.test_delivery(&canonical).await;
        if outcome.should_delete() {
            let kind = outcome.kind.unwrap_or(FailureKind::UnknownError);
            return Err(RegistrationError::TestFailed {
                kind,
                message: kind.user_message().to_string(),
            });
        }
        if !outcome.success {
            // Transient failure: the endpoint may just be flaky right now,
            // so registration proceeds and dispatch retries will sort it out.
            warn!(
                "Test delivery to {canonical} failed transiently ({:?}); registering anyway",
                outcome.kind
            );
        }

        let row = self
            .store
            .create_or_reactivate(&canonical)
            .await
            .map_err(RegistrationError::Internal)?;
        info!("Registered webhook {} ({})", row.id, row.url);
        Ok((row, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedVerifier, MemoryStore, ScriptedDeliverer};

    fn hook_url(n: u64) -> String {
        format!(
            "https://discord.com/api/webhooks/1234567890123456{n}/{}",
            "t".repeat(64)
        )
    }

    fn service(
        store: Arc<MemoryStore>,
        deliverer: Arc<ScriptedDeliverer>,
        verify: bool,
        max_active: u64,
    ) -> RegistrationService {
        RegistrationService::new(store, Arc::new(FixedVerifier(verify)), deliverer, max_active)
    }

    #[tokio::test]
    async fn happy_path_registers_and_tests() {
        let store = Arc::new(MemoryStore::new());
        let deliverer = Arc::new(ScriptedDeliverer::all_ok());
        let svc = service(Arc::clone(&store), Arc::clone(&deliverer), true, 100);

        let (row, outcome) = svc.register(&hook_url(1), Some("tok")).await.unwrap();
        assert!(row.is_active);
        assert!(outcome.success);
        assert_eq!(deliverer.test_calls(), 1);
        assert_eq!(store.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_token_is_a_validation_error() {
        let svc = service(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedDeliverer::all_ok()),
            true,
            100,
        );
        let err = svc.register(&hook_url(1), Some("  ")).await.unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Validation(ValidationError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn rejected_token_fails_verification() {
        let svc = service(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedDeliverer::all_ok()),
            false,
            100,
        );
        let err = svc.register(&hook_url(1), Some("tok")).await.unwrap_err();
        assert!(matches!(err, RegistrationError::VerificationFailed));
    }

    #[tokio::test]
    async fn duplicate_active_url_conflicts() {
        let store = Arc::new(MemoryStore::new());
        store.seed_active(&hook_url(1)).await;
        let svc = service(store, Arc::new(ScriptedDeliverer::all_ok()), true, 100);

        // Same endpoint, noisier spelling.
        let err = svc
            .register(&format!("{}/", hook_url(1)), Some("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Duplicate));
    }

    #[tokio::test]
    async fn quota_is_enforced() {
        let store = Arc::new(MemoryStore::new());
        store.seed_active(&hook_url(1)).await;
        store.seed_active(&hook_url(2)).await;
        let svc = service(store, Arc::new(ScriptedDeliverer::all_ok()), true, 2);

        let err = svc.register(&hook_url(3), Some("tok")).await.unwrap_err();
        assert!(matches!(err, RegistrationError::QuotaExceeded { limit: 2 }));
    }

    #[tokio::test]
    async fn permanent_test_failure_blocks_registration() {
        let store = Arc::new(MemoryStore::new());
        let deliverer = Arc::new(ScriptedDeliverer::test_failing(FailureKind::NotFound));
        let svc = service(Arc::clone(&store), deliverer, true, 100);

        let err = svc.register(&hook_url(1), Some("tok")).await.unwrap_err();
        match err {
            RegistrationError::TestFailed { kind, .. } => assert_eq!(kind, FailureKind::NotFound),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transient_test_failure_still_registers() {
        let store = Arc::new(MemoryStore::new());
        let deliverer = Arc::new(ScriptedDeliverer::test_failing(FailureKind::NetworkError));
        let svc = service(Arc::clone(&store), deliverer, true, 100);

        let (row, outcome) = svc.register(&hook_url(1), Some("tok")).await.unwrap();
        assert!(row.is_active);
        assert!(!outcome.success);
        assert_eq!(store.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reactivation_is_preferred_over_insertion() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed_active(&hook_url(1)).await;
        store.deactivate(id).await.unwrap();

        let svc = service(Arc::clone(&store), Arc::new(ScriptedDeliverer::all_ok()), true, 100);
        let (row, _) = svc.register(&hook_url(1), Some("tok")).await.unwrap();
        assert_eq!(row.id, id);
        assert!(row.is_active);
    }
}
