pub mod attendance;
pub mod checkpoint;
pub mod event;
pub mod qr_credential;
pub mod ticket;

pub use attendance::{Attendance, ScanResult};
pub use checkpoint::Checkpoint;
pub use event::{CheckinPolicy, Event};
pub use qr_credential::QrCredential;
pub use ticket::{Ticket, TicketStatus};
