pub mod dispatcher;
pub mod whatsapp;

pub use dispatcher::{Channel, ChannelReport, DispatchReport, NotificationDispatcher};
pub use whatsapp::TwilioWhatsApp;
