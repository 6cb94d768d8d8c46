use crate::error::Error;
use crate::models::{AttendanceRecord, CommandDefinition, CommandStats, NewCommand, Platform};

/// Command storage. Names are unique and stored lowercase.
///
/// Implementations must make `increment_counter` and `increment_uses`
/// atomic: concurrent callers never lose an increment.
#[cfg_attr(feature = "mocks", mockall::automock)]
pub trait CommandRepository: Send + Sync {
    fn get_command(&self, name: &str) -> Result<Option<CommandDefinition>, Error>;
    fn list_commands(&self) -> Result<Vec<CommandDefinition>, Error>;
    /// Fails with `Error::DuplicateCommand` when the name is taken.
    fn create_command(&self, cmd: &NewCommand) -> Result<i64, Error>;
    fn update_command(&self, id: i64, cmd: &NewCommand) -> Result<(), Error>;
    fn delete_command(&self, id: i64) -> Result<(), Error>;
    fn set_command_active(&self, id: i64, active: bool) -> Result<(), Error>;
    /// Returns the counter value after the increment.
    fn increment_counter(&self, name: &str) -> Result<u64, Error>;
    fn increment_uses(&self, name: &str) -> Result<(), Error>;
    fn command_stats(&self) -> Result<CommandStats, Error>;
}

#[cfg_attr(feature = "mocks", mockall::automock)]
pub trait AttendanceRepository: Send + Sync {
    /// Insert with a count of 1, or add 1 to the existing total. Returns the new total.
    fn register_attendance(&self, nickname: &str, platform: Platform) -> Result<u64, Error>;
    /// Ordered by total, highest first.
    fn list_attendance(&self) -> Result<Vec<AttendanceRecord>, Error>;
    fn delete_attendance(&self, id: i64) -> Result<(), Error>;
    fn set_attendance_total(&self, id: i64, total: u64) -> Result<(), Error>;
    /// Deletes every record of one platform; returns how many went away.
    fn clear_platform(&self, platform: Platform) -> Result<u64, Error>;
}
