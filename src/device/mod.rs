//! Device connectivity: cloud client, remote commands and the streaming socket

pub mod cloud;
pub mod manager;
pub mod remote;
pub mod session;
pub mod tone;

pub use cloud::{DeviceCloud, DeviceStatus, ParticleCloud};
pub use manager::DeviceConnectionManager;
pub use remote::DeviceRemote;
pub use session::StreamingSession;
pub use tone::{Note, NoteLength, ToneSpec};
