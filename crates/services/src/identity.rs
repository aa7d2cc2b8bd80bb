use quiz_core::model::UserId;

/// The authenticated student an operation runs on behalf of.
///
/// Resolved by whatever identity provider fronts the services and passed
/// explicitly into every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StudentContext {
    user_id: UserId,
}

impl StudentContext {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl From<UserId> for StudentContext {
    fn from(user_id: UserId) -> Self {
        Self::new(user_id)
    }
}
