//! Simulated buses and scripted CANopen nodes for testing the master
pub mod sim_bus;
pub mod sim_node;
