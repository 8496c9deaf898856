//! Throughput-бенчмарки публикации в AMQP-брокер.
//!
//! Стратегии распределения нагрузки ([`Strategy`]) публикуют синтетические
//! [`BenchMessage`] через [`Connector`]/[`Publisher`]: реальный брокер
//! ([`AmqpConnector`]) или in-memory ([`MemoryBroker`]).

pub mod amqp;
pub mod error;
pub mod memory;
pub mod message;
pub mod partition;
pub mod progress;
pub mod publisher;
pub mod report;
pub mod strategy;

pub use amqp::AmqpConnector;
pub use error::BenchError;
pub use memory::MemoryBroker;
pub use message::BenchMessage;
pub use publisher::{ChannelOptions, Connector, Publisher};
pub use report::{RunReport, WorkerTally};
pub use strategy::{available_cpus, run, RunParams, Strategy};
