//! ntfs_bcache: Pure Rust NTFS 扇区缓存
//!
//! 这是一个位于 NTFS 卷驱动与底层块设备之间的扇区缓存库，旨在提供：
//! - **零 unsafe 代码**（除对齐缓冲区分配外）
//! - **Rust 惯用风格**的 API
//! - **完整的类型安全**
//! - **`no_std` 兼容**（仅依赖 `alloc`）
//!
//! 缓存以固定大小的*页*（32-64 个扇区）为单位缓冲扇区，吸收反复的
//! 小读取（如部分扇区的元数据探测），合并写入，并向上层 NTFS 逻辑
//! 提供统一的扇区读写 API。替换策略为最久未用页优先、空闲槽位优先，
//! 使扇区均匀分布在各页上：当工作集不超过页数时，所有页最终都会
//! 留在缓存中。
//!
//! # 示例
//!
//! ```rust,ignore
//! use ntfs_bcache::{DiscInterface, NtfsCache, Result};
//!
//! // 实现 DiscInterface trait
//! struct MyDisc {
//!     // ...
//! }
//!
//! impl DiscInterface for MyDisc {
//!     // 实现必要的方法
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let disc = MyDisc::new();
//!
//!     // 8 页，每页 64 个扇区，分区共 1_000_000 个 512 字节扇区
//!     let mut cache = NtfsCache::new(disc, 8, 64, 1_000_000, 512)?;
//!
//!     // 读取扇区
//!     let mut buf = vec![0u8; 512];
//!     cache.read_sector(&mut buf, 0)?;
//!
//!     // 结束前把脏扇区写回设备
//!     cache.flush()?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`disc`] - 块设备能力抽象
//! - [`consts`] - 常量定义
//! - [`cache`] - 扇区缓存核心
//!
//! # 并发模型
//!
//! 缓存本身**不做内部同步**。正确性由外围的卷逻辑负责：所有缓存访问
//! 都应在卷级互斥原语内串行执行。在该临界区内缓存表现为单线程状态机。

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备能力抽象
pub mod disc;

/// 常量定义
pub mod consts;

/// 扇区缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use disc::{DiscFeatures, DiscInterface};

// 缓存
pub use cache::{AlignedBuf, CacheStats, NtfsCache};
