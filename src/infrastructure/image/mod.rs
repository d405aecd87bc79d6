//! Image storage infrastructure.
//!
//! This module provides:
//! - PNG/JPEG codec adapter
//! - Library and key to path mapping
//! - Memory caching with cost-bounded LRU eviction
//! - Disk persistence per library directory
//! - Single-flight asynchronous write pipeline

pub mod codec;
pub mod disk_store;
pub mod memory_cache;
pub mod path_mapper;
pub mod write_coordinator;

pub use codec::{DEFAULT_JPEG_QUALITY, StandardCodec};
pub use disk_store::DiskImageStore;
pub use memory_cache::{CacheStats, DEFAULT_MEMORY_BUDGET, MemoryImageCache};
pub use write_coordinator::{
    DEFAULT_MAX_CONCURRENT_WRITES, WriteCoordinator, WriteHandle, WriteResult,
};
