pub mod blob;
pub mod documents;
pub mod intake;
pub mod mailer;
pub mod retry;
pub mod routing;
pub mod s3;
pub mod throttle;
