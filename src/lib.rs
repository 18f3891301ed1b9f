pub mod config;
pub mod judge;
pub mod routes;
pub mod sandbox;
pub mod service;
pub mod web_server;
