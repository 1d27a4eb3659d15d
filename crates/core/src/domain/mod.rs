pub mod approval;
pub mod department;
pub mod order;
pub mod user;
