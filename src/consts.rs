//! NTFS 扇区缓存常量定义
//!
//! 这个模块包含缓存几何与对齐相关的常量定义。

//=============================================================================
// 缓存几何
//=============================================================================

/// 最小缓存页数
///
/// 构造时 `page_count` 会被钳制到不小于此值。
pub const MIN_CACHE_PAGES: usize = 4;

/// 默认缓存页数
pub const DEFAULT_CACHE_PAGES: usize = 8;

/// 每页最小扇区数
pub const MIN_SECTORS_PER_PAGE: u64 = 32;

/// 每页最大扇区数
///
/// 上限为 64 是脏位图能装进单个 `u64` 的前提，也是 first/last set bit
/// 可以用 O(1) 内建指令求出的前提。
pub const MAX_SECTORS_PER_PAGE: u64 = 64;

/// 默认每页扇区数
pub const DEFAULT_SECTORS_PER_PAGE: u64 = 64;

//=============================================================================
// 扇区与对齐
//=============================================================================

/// 默认物理扇区大小（512 字节）
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// 缓冲区对齐（字节）
///
/// 槽位缓冲区按此对齐分配，使其可直接作为设备 DMA 目标；
/// 旁路路径同样要求调用者缓冲区满足此对齐。
pub const BUFFER_ALIGN: usize = 32;
