pub mod allocation;
pub mod slow_clients;
