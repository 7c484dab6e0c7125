//! Connection setup: create a backend user for a display name, then link their
//! mail account, possibly through an external authorization page.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::gateway::Gateway;
use crate::models::{ConnectionAttempt, ConnectionInitiation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStep {
    CollectingInfo,
    Connecting,
    AwaitingAuthorization(ConnectionAttempt),
    Established { user_id: String },
}

/// What a successful step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupProgress {
    /// The user must visit `redirect_url` and then confirm.
    AuthorizationRequired { redirect_url: String },
    Established { user_id: String },
}

pub struct ConnectionSetup {
    gateway: Rc<dyn Gateway>,
    step: RefCell<SetupStep>,
    error: RefCell<Option<String>>,
}

impl ConnectionSetup {
    pub fn new(gateway: Rc<dyn Gateway>) -> Self {
        Self {
            gateway,
            step: RefCell::new(SetupStep::CollectingInfo),
            error: RefCell::new(None),
        }
    }

    pub fn step(&self) -> SetupStep {
        self.step.borrow().clone()
    }

    /// Last user-visible failure, cleared when the next operation starts.
    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn authorization_url(&self) -> Option<String> {
        match &*self.step.borrow() {
            SetupStep::AwaitingAuthorization(attempt) => attempt.redirect_url.clone(),
            _ => None,
        }
    }

    pub fn reset(&self) {
        *self.step.borrow_mut() = SetupStep::CollectingInfo;
        *self.error.borrow_mut() = None;
    }

    /// Creates a user for `display_name` and starts linking their account.
    pub async fn submit_name(&self, display_name: &str) -> Result<SetupProgress, AppError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(self.fail(AppError::empty_field("name"), SetupStep::CollectingInfo));
        }
        if matches!(*self.step.borrow(), SetupStep::Connecting) {
            return Err(AppError::Unexpected("connection setup already in progress".to_string()));
        }

        *self.error.borrow_mut() = None;
        *self.step.borrow_mut() = SetupStep::Connecting;

        let user_id = format!("user_{}", uuid::Uuid::new_v4().simple());
        let initiation = match self.create_and_connect(&user_id, display_name).await {
            Ok(initiation) => initiation,
            Err(e) => {
                error!("Connection setup for {user_id} failed: {e}");
                return Err(self.fail(e, SetupStep::CollectingInfo));
            }
        };

        match initiation.redirect_url {
            Some(redirect_url) => {
                info!("User {user_id} must authorize at {redirect_url}");
                *self.step.borrow_mut() = SetupStep::AwaitingAuthorization(ConnectionAttempt {
                    user_id,
                    redirect_url: Some(redirect_url.clone()),
                    connection_id: initiation.connection_id,
                });
                Ok(SetupProgress::AuthorizationRequired { redirect_url })
            }
            None => {
                info!("User {user_id} connected without authorization redirect");
                Ok(self.establish(user_id))
            }
        }
    }

    /// Asks the gateway whether the external authorization went through.
    pub async fn confirm_authorization(&self) -> Result<SetupProgress, AppError> {
        let attempt = match &*self.step.borrow() {
            SetupStep::AwaitingAuthorization(attempt) => attempt.clone(),
            _ => return Err(AppError::MissingConnection),
        };
        *self.error.borrow_mut() = None;
        let awaiting = SetupStep::AwaitingAuthorization(attempt.clone());

        let Some(connection_id) = attempt.connection_id.as_deref() else {
            return Err(self.fail(AppError::MissingConnection, awaiting));
        };

        match self.gateway.check_connection_status(connection_id).await {
            Ok(status) if status.is_active() => Ok(self.establish(attempt.user_id)),
            Ok(status) => {
                warn!("Connection {connection_id} not active yet: {}", status.status);
                Err(self.fail(AppError::NotAuthorized { status: status.status }, awaiting))
            }
            Err(e) => {
                error!("Failed to check connection {connection_id}: {e}");
                Err(self.fail(e, awaiting))
            }
        }
    }

    async fn create_and_connect(
        &self,
        user_id: &str,
        display_name: &str,
    ) -> Result<ConnectionInitiation, AppError> {
        self.gateway.create_user(user_id, display_name).await?;
        self.gateway.initiate_connection(user_id).await
    }

    fn establish(&self, user_id: String) -> SetupProgress {
        *self.step.borrow_mut() = SetupStep::Established { user_id: user_id.clone() };
        SetupProgress::Established { user_id }
    }

    fn fail(&self, err: AppError, fallback: SetupStep) -> AppError {
        *self.error.borrow_mut() = Some(err.to_string());
        *self.step.borrow_mut() = fallback;
        err
    }
}
