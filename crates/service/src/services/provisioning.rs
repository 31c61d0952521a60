//! Account registration across the identity provider and local storage.
//!
//! Registration runs as a small state machine:
//!
//! ```text
//! Validating -> CreatingIdentity -> PersistingLocal -> Committed
//!      |               |                  |
//!      v               v                  v
//!    Failed          Failed          RollingBack -> RolledBack | RollbackFailed
//! ```
//!
//! `RollingBack` is entered at most once and always leaves for a terminal
//! state, so each failed registration makes exactly one compensating delete.
//!
//! Once the identity provider has issued an id, the rest of the saga runs on
//! a spawned task that the request only waits on. A caller that disconnects
//! mid-insert or mid-rollback cannot stop the insert, the compensating delete
//! (bounded by its own time budget) or the orphan report.

use std::sync::Arc;
use std::time::Duration;

use bq_account_core::{
    Account, Email, QueryFilter, RegisterAccount, RemoteId, split_display_name,
    username_from_email,
};
use chrono::Utc;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{Instrument, error, info, instrument, warn};

use super::listing::AccountListService;
use crate::db::{AccountStore, RepositoryError};
use crate::identity::{IdentityError, IdentityProvider, NewIdentity};

/// What happened to the remote identity after a failed local insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// No remote identity existed when the failure occurred.
    NotNeeded,
    /// The remote identity was deleted.
    RolledBack,
    /// The delete failed; the remote identity is orphaned.
    RollbackFailed { remote_id: RemoteId },
}

/// Registration failures.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// An account with this email or phone already exists.
    #[error("an account with this email or phone already exists")]
    AlreadyExists,

    /// The request is malformed.
    #[error("invalid {field}: {message}")]
    InvalidRequest {
        field: &'static str,
        message: String,
    },

    /// The identity provider rejected or failed the create call.
    #[error("identity provider error: {0}")]
    Upstream(#[source] IdentityError),

    /// Storage failed. The message is the same whatever `compensation` says.
    #[error("failed to persist account: {source}")]
    Persistence {
        #[source]
        source: RepositoryError,
        compensation: CompensationOutcome,
    },
}

impl ProvisioningError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field,
            message: message.into(),
        }
    }

    /// Compensation result for persistence failures.
    #[must_use]
    pub const fn compensation(&self) -> Option<&CompensationOutcome> {
        match self {
            Self::Persistence { compensation, .. } => Some(compensation),
            _ => None,
        }
    }
}

/// The compensating delete failed and a remote identity was left behind.
#[derive(Debug, Error)]
#[error("failed to delete orphaned identity {remote_id}: {reason}")]
pub struct CompensationError {
    pub remote_id: RemoteId,
    pub reason: String,
}

/// Validated registration input.
struct Validated {
    name: String,
    email: Email,
    phone: String,
    username: String,
    password: SecretString,
}

enum SagaState {
    Validating(RegisterAccount),
    CreatingIdentity(Validated),
    PersistingLocal {
        remote_id: RemoteId,
        account: Account,
    },
    RollingBack {
        remote_id: RemoteId,
        cause: RepositoryError,
    },
    Committed(Account),
    RolledBack(RepositoryError),
    RollbackFailed {
        cause: RepositoryError,
        orphan: CompensationError,
    },
    Failed(ProvisioningError),
}

/// Registers accounts.
#[derive(Clone)]
pub struct AccountProvisioningSaga {
    listing: AccountListService,
    store: Arc<dyn AccountStore>,
    identity: Arc<dyn IdentityProvider>,
    compensation_timeout: Duration,
}

impl AccountProvisioningSaga {
    #[must_use]
    pub fn new(
        listing: AccountListService,
        store: Arc<dyn AccountStore>,
        identity: Arc<dyn IdentityProvider>,
        compensation_timeout: Duration,
    ) -> Self {
        Self {
            listing,
            store,
            identity,
            compensation_timeout,
        }
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` when the email or phone is taken (nothing is created)
    /// - `InvalidRequest` for a missing name or password, or a malformed email
    /// - `Upstream` when the identity provider fails (nothing is persisted)
    /// - `Persistence` when storage fails; any identity created for this
    ///   request has been deleted, or logged as orphaned
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterAccount) -> Result<Account, ProvisioningError> {
        let mut state = SagaState::Validating(request);
        loop {
            state = match state {
                SagaState::Validating(request) => self.validate(request).await,
                SagaState::CreatingIdentity(validated) => self.create_identity(validated).await,
                SagaState::PersistingLocal { remote_id, account } => {
                    return self.finish_detached(remote_id, account).await;
                }
                state => return self.drive(state).await,
            };
        }
    }

    /// Run the saga from the local insert onward on its own task.
    async fn finish_detached(
        &self,
        remote_id: RemoteId,
        account: Account,
    ) -> Result<Account, ProvisioningError> {
        let saga = self.clone();
        let state = SagaState::PersistingLocal {
            remote_id: remote_id.clone(),
            account,
        };
        let task = tokio::spawn(
            async move { saga.drive(state).await }.instrument(tracing::Span::current()),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = format!("registration task failed: {e}");
                report_orphan(&CompensationError {
                    remote_id: remote_id.clone(),
                    reason: reason.clone(),
                });
                Err(ProvisioningError::Persistence {
                    source: RepositoryError::Interrupted(reason),
                    compensation: CompensationOutcome::RollbackFailed { remote_id },
                })
            }
        }
    }

    /// Step through states until a terminal one.
    async fn drive(&self, mut state: SagaState) -> Result<Account, ProvisioningError> {
        loop {
            state = match state {
                SagaState::Validating(request) => self.validate(request).await,
                SagaState::CreatingIdentity(validated) => self.create_identity(validated).await,
                SagaState::PersistingLocal { remote_id, account } => {
                    self.persist(remote_id, account).await
                }
                SagaState::RollingBack { remote_id, cause } => {
                    self.roll_back(remote_id, cause).await
                }
                SagaState::Committed(account) => {
                    self.forget_lookups(&account).await;
                    info!(account_id = %account.id, remote_id = %account.remote_id, "Account registered");
                    return Ok(account);
                }
                SagaState::RolledBack(cause) => {
                    return Err(ProvisioningError::Persistence {
                        source: cause,
                        compensation: CompensationOutcome::RolledBack,
                    });
                }
                SagaState::RollbackFailed { cause, orphan } => {
                    report_orphan(&orphan);
                    return Err(ProvisioningError::Persistence {
                        source: cause,
                        compensation: CompensationOutcome::RollbackFailed {
                            remote_id: orphan.remote_id,
                        },
                    });
                }
                SagaState::Failed(err) => return Err(err),
            };
        }
    }

    async fn validate(&self, request: RegisterAccount) -> SagaState {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return SagaState::Failed(ProvisioningError::invalid("name", "is required"));
        }
        let email = match Email::parse(&request.email) {
            Ok(email) => email,
            Err(e) => return SagaState::Failed(ProvisioningError::invalid("email", e.to_string())),
        };
        if request.password.trim().is_empty() {
            return SagaState::Failed(ProvisioningError::invalid("password", "is required"));
        }
        let phone = request.phone_number().to_string();

        // Email and phone are each unique on their own, so a hit on either
        // blocks. Both are checked by exact match, never by substring, so
        // `alice@` is not blocked by an existing `malice@`.
        match self.is_taken(&email, &phone).await {
            Ok(false) => {}
            Ok(true) => return SagaState::Failed(ProvisioningError::AlreadyExists),
            Err(source) => {
                return SagaState::Failed(ProvisioningError::Persistence {
                    source,
                    compensation: CompensationOutcome::NotNeeded,
                });
            }
        }

        let username = request
            .requested_username()
            .map_or_else(|| username_from_email(&email), str::to_string);

        SagaState::CreatingIdentity(Validated {
            name,
            email,
            phone,
            username,
            password: SecretString::from(request.password),
        })
    }

    /// Exact-match check for an existing email (case-insensitive) or phone.
    async fn is_taken(&self, email: &Email, phone: &str) -> Result<bool, RepositoryError> {
        let by_email = self
            .listing
            .lookup(&QueryFilter::new().with_email(email.as_str()))
            .await?;
        if by_email.iter().any(|a| a.email.matches(email.as_str())) {
            return Ok(true);
        }

        if phone.is_empty() {
            return Ok(false);
        }
        let by_phone = self
            .listing
            .lookup(&QueryFilter::new().with_phone(phone))
            .await?;
        Ok(by_phone.iter().any(|a| a.phone == phone))
    }

    async fn create_identity(&self, validated: Validated) -> SagaState {
        let (first_name, last_name) = split_display_name(&validated.name);
        let identity = NewIdentity {
            email: validated.email.as_str().to_string(),
            username: validated.username.clone(),
            password: validated.password,
            first_name,
            last_name,
        };

        match self.identity.create_identity(&identity).await {
            Ok(remote_id) => SagaState::PersistingLocal {
                account: Account::pending(
                    remote_id.clone(),
                    validated.name,
                    validated.email,
                    validated.username,
                    validated.phone,
                    Utc::now(),
                ),
                remote_id,
            },
            Err(e) => {
                warn!(error = %e, "Identity provider rejected registration");
                SagaState::Failed(ProvisioningError::Upstream(e))
            }
        }
    }

    async fn persist(&self, remote_id: RemoteId, mut account: Account) -> SagaState {
        match self.store.insert(&mut account).await {
            Ok(()) => SagaState::Committed(account),
            Err(cause) => {
                warn!(remote_id = %remote_id, error = %cause, "Account insert failed, rolling back identity");
                SagaState::RollingBack { remote_id, cause }
            }
        }
    }

    /// Delete the identity created for this request, within the compensation budget.
    async fn roll_back(&self, remote_id: RemoteId, cause: RepositoryError) -> SagaState {
        let budget = self.compensation_timeout;
        let deleted = tokio::time::timeout(
            budget,
            self.identity.delete_identity(&remote_id, budget),
        )
        .await
        .unwrap_or(Err(IdentityError::Timeout(budget)));

        match deleted {
            Ok(()) => {
                info!(remote_id = %remote_id, "Orphaned identity rolled back");
                SagaState::RolledBack(cause)
            }
            Err(e) => SagaState::RollbackFailed {
                cause,
                orphan: CompensationError {
                    remote_id,
                    reason: e.to_string(),
                },
            },
        }
    }

    /// Drop cached listings for the lookups this registration made stale.
    async fn forget_lookups(&self, account: &Account) {
        self.listing
            .invalidate(&QueryFilter::new().with_email(account.email.as_str()))
            .await;
        if !account.phone.is_empty() {
            self.listing
                .invalidate(&QueryFilter::new().with_phone(&account.phone))
                .await;
        }
    }
}

/// Log an orphaned identity for manual reconciliation.
fn report_orphan(orphan: &CompensationError) {
    error!(
        orphaned_remote_id = %orphan.remote_id,
        error = %orphan,
        "Compensation failed, remote identity orphaned"
    );
    sentry::with_scope(
        |scope| {
            scope.set_tag("orphaned_remote_id", orphan.remote_id.as_str());
        },
        || sentry::capture_message(&orphan.to_string(), sentry::Level::Fatal),
    );
}
