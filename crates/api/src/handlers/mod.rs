pub mod health;
pub mod scores;
pub mod submissions;
pub mod tasks;
