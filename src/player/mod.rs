pub mod backoff;
pub mod control;
pub mod equalizer;
pub mod playback_loop;
pub mod session;
pub mod state;
pub mod track;

pub use control::PlaybackControl;
pub use equalizer::Equalizer;
pub use session::{Departure, Session, SessionDeps};
pub use state::{SessionSnapshot, SessionStatus};
pub use track::{StreamHandle, Track, TrackRequest, TrackView};
