mod discord;
mod pushover;
mod smtp;

pub use discord::DiscordBackend;
pub use pushover::PushoverBackend;
pub use smtp::SmtpBackend;
