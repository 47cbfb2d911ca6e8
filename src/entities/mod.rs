pub mod client;
pub mod company;
pub mod document;
pub mod intake_link;
pub mod person;
pub mod property;
