pub mod repository_traits;
pub mod audio_traits;

pub use repository_traits::{AttendanceRepository, CommandRepository};
pub use audio_traits::{AudioPlayer, SpeechRenderer};

#[cfg(feature = "mocks")]
pub use repository_traits::{MockAttendanceRepository, MockCommandRepository};
#[cfg(feature = "mocks")]
pub use audio_traits::{MockAudioPlayer, MockSpeechRenderer};
