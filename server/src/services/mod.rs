pub mod oracle_network;
pub mod responder;
pub mod sandbox;
