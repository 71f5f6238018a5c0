pub mod alert;
pub mod cluster;
pub mod count_smoother;
pub mod detection;
pub mod evidence;
pub mod group_engine;
pub mod render;
pub mod schedule;
pub mod signal_gate;
pub mod tracker;
