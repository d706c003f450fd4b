pub mod backup;
pub mod connect;
pub mod create;
pub mod exec;
pub mod info;
pub mod list;
pub mod logs;
pub mod restart;
pub mod rm;
pub mod start;
pub mod status;
pub mod stop;
pub mod update;
