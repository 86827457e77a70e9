pub mod decision;
pub mod orchestrator;
pub mod storage;
pub mod trust;
