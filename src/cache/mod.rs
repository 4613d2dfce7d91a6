//! 扇区缓存模块
//!
//! 这个模块提供了完整的 NTFS 扇区缓存实现，对应原 C 驱动的
//! `cache2.c` 功能。
//!
//! # 主要组件
//!
//! - [`AlignedBuf`] - 32 字节对齐的槽位缓冲区（可兼作 DMA 目标）
//! - [`NtfsCache`] - 缓存管理器：页表、替换策略、写回与访问层
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 设计原理
//!
//! 页表是一段物理连续的固定槽位序列，查找全部为线性扫描。这是可接受
//! 的，因为页数很小（典型 4-32），扫描开销远小于设备 I/O。替换策略为
//! 严格 LRU 加空闲槽位强制优先：
//!
//! 1. **命中扫描**：同一趟线性扫描里完成命中检测与受害者跟踪
//! 2. **受害者选择**：空闲槽位胜过任何非空闲槽位，否则取最小访问刻
//! 3. **平局**：取最先遇到的槽位下标
//!
//! 每个槽位带一个 `u64` 脏位图，允许亚页粒度写回：驱逐或冲刷时只对
//! 覆盖 `[最低脏位, 最高脏位]` 的连续区间发出**一次**设备写（中间的
//! 干净扇区一并写出，换取单次长传输）。对齐的整页批量传输则完全绕过
//! 缓存直达设备。
//!
//! # 与原 C 实现的对应关系
//!
//! | cache2.c                            | ntfs_bcache                        |
//! |-------------------------------------|------------------------------------|
//! | `NTFS_CACHE`                        | [`NtfsCache`]                      |
//! | `NTFS_CACHE_ENTRY`                  | `CachePage`（模块内部）             |
//! | `ntfs_align()` 缓冲区               | [`AlignedBuf`]                     |
//! | `_NTFS_cache_getPage()`             | `NtfsCache::get_page()`            |
//! | `_NTFS_cache_findPage()`            | `NtfsCache::find_intersecting()`   |
//! | `_NTFS_cache_readSectors()`         | [`NtfsCache::read_sectors()`]      |
//! | `_NTFS_cache_writeSectors()`        | [`NtfsCache::write_sectors()`]     |
//! | `_NTFS_cache_readPartialSector()`   | [`NtfsCache::read_partial()`]      |
//! | `_NTFS_cache_writePartialSector()`  | [`NtfsCache::write_partial()`]     |
//! | `_NTFS_cache_eraseWritePartialSector()` | [`NtfsCache::erase_write_partial()`] |
//! | `_NTFS_cache_readLittleEndianValue()`   | [`NtfsCache::read_le()`]       |
//! | `_NTFS_cache_writeLittleEndianValue()`  | [`NtfsCache::write_le()`]      |
//! | `_NTFS_cache_flush()`               | [`NtfsCache::flush()`]             |
//! | `_NTFS_cache_invalidate()`          | [`NtfsCache::invalidate()`]        |
//! | `_NTFS_cache_constructor()`         | [`NtfsCache::new()`]               |
//! | `_NTFS_cache_destructor()`          | `Drop`（尽力冲刷，忽略失败）        |
//!
//! # 内存分配要求
//!
//! 本模块依赖 `alloc` crate，需要用户提供全局分配器。
//! 参见 [`alloc::alloc::GlobalAlloc`] 和 `#[global_allocator]`。

mod buffer;
mod page;
mod sector_cache;

pub use buffer::AlignedBuf;
pub use sector_cache::{CacheStats, NtfsCache};
