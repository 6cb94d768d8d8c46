use serde::{Deserialize, Serialize};

/// Uniform role triple derived from any platform's payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoles {
    pub is_broadcaster: bool,
    pub is_moderator: bool,
    pub is_subscriber: bool,
}

impl UserRoles {
    /// A broadcaster is always also a moderator and a subscriber.
    pub fn normalized(self) -> Self {
        Self {
            is_broadcaster: self.is_broadcaster,
            is_moderator: self.is_moderator || self.is_broadcaster,
            is_subscriber: self.is_subscriber || self.is_broadcaster,
        }
    }
}
