//! 缓存页槽位
//!
//! 对应原 C 驱动的 `NTFS_CACHE_ENTRY` 结构。
//!
//! 一个槽位处于三种状态之一：
//!
//! - **FREE** - 不覆盖任何扇区（哨兵基址，计数、访问刻、脏位图全零）
//! - **CLEAN** - 覆盖一页扇区，内容与设备一致
//! - **DIRTY** - 覆盖一页扇区，脏位图中置位的扇区与设备不一致
//!
//! 脏位图是单个 `u64`：每页最多 64 个扇区的约束正是为了让位图装进
//! 一个机器字，使最低/最高脏位可以用 O(1) 内建指令求出。

use super::buffer::AlignedBuf;
use crate::error::Result;

/// 空闲槽位的哨兵基址
const CACHE_FREE: u64 = u64::MAX;

/// 缓存页槽位
///
/// 持有至多一页扇区的副本。缓冲区在构造时按对齐要求分配一次，
/// 此后随槽位复用，状态复位时不会释放。
#[derive(Debug)]
pub(super) struct CachePage {
    /// 页的起始扇区号，空闲时为哨兵值
    sector: u64,
    /// 页内有效扇区数（分区尾页可能不足一整页）
    pub(super) count: u64,
    /// 最近一次访问的刻度，用于 LRU 排序
    pub(super) last_access: u64,
    /// 脏位图：第 k 位置位表示扇区 `sector + k` 与设备不一致
    dirty: u64,
    /// 页数据
    pub(super) buffer: AlignedBuf,
}

impl CachePage {
    /// 创建空闲槽位并分配其缓冲区
    pub(super) fn new(buffer_len: usize) -> Result<Self> {
        Ok(Self {
            sector: CACHE_FREE,
            count: 0,
            last_access: 0,
            dirty: 0,
            buffer: AlignedBuf::new_zeroed(buffer_len)?,
        })
    }

    /// 槽位是否空闲
    pub(super) fn is_free(&self) -> bool {
        self.sector == CACHE_FREE
    }

    /// 页的起始扇区号
    ///
    /// 仅对非空闲槽位有意义。
    pub(super) fn base_sector(&self) -> u64 {
        self.sector
    }

    /// 槽位是否覆盖指定扇区
    pub(super) fn contains(&self, sector: u64) -> bool {
        !self.is_free() && sector >= self.sector && sector - self.sector < self.count
    }

    /// 将槽位重定位到新的页
    ///
    /// 前置条件：脏位图已清零（写回成功或槽位本就空闲）。
    pub(super) fn rebase(&mut self, base: u64, count: u64) {
        debug_assert_eq!(self.dirty, 0);
        self.sector = base;
        self.count = count;
    }

    /// 复位到空闲状态；缓冲区保留复用
    pub(super) fn reset(&mut self) {
        self.sector = CACHE_FREE;
        self.count = 0;
        self.last_access = 0;
        self.dirty = 0;
    }

    /// 槽位是否带有脏扇区
    pub(super) fn is_dirty(&self) -> bool {
        self.dirty != 0
    }

    /// 脏位图快照
    #[cfg(test)]
    pub(super) fn dirty_bits(&self) -> u64 {
        self.dirty
    }

    /// 脏区间的最低与最高置位下标
    ///
    /// 位图为零时返回 `None`。
    pub(super) fn dirty_span(&self) -> Option<(u64, u64)> {
        if self.dirty == 0 {
            return None;
        }
        let first = self.dirty.trailing_zeros() as u64;
        let last = 63 - self.dirty.leading_zeros() as u64;
        Some((first, last))
    }

    /// 清除脏位图（写回成功后调用）
    pub(super) fn clear_dirty(&mut self) {
        self.dirty = 0;
    }

    /// 标记页内 `[local, local + len)` 的扇区为脏
    pub(super) fn mark_dirty_range(&mut self, local: u64, len: u64) {
        debug_assert!(local + len <= self.count);
        self.dirty |= dirty_mask(local, len);
    }
}

/// 构造覆盖 `[local, local + len)` 的脏位掩码
///
/// `len == 64` 时 `(1 << len) - 1` 的移位会越界，这里用右移总是合法的
/// 形式处理整页写入。要求 `1 <= len` 且 `local + len <= 64`。
pub(super) fn dirty_mask(local: u64, len: u64) -> u64 {
    debug_assert!(len >= 1 && local + len <= 64);
    (u64::MAX >> (64 - len)) << local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_page_is_free() {
        let page = CachePage::new(512).unwrap();
        assert!(page.is_free());
        assert!(!page.is_dirty());
        assert_eq!(page.count, 0);
        assert_eq!(page.last_access, 0);
        assert!(!page.contains(0));
        assert!(!page.contains(u64::MAX));
    }

    #[test]
    fn test_contains_range() {
        let mut page = CachePage::new(512).unwrap();
        page.rebase(32, 32);
        assert!(page.contains(32));
        assert!(page.contains(63));
        assert!(!page.contains(31));
        assert!(!page.contains(64));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut page = CachePage::new(512).unwrap();
        page.rebase(0, 32);
        page.last_access = 7;
        page.mark_dirty_range(3, 2);
        page.reset();
        assert!(page.is_free());
        assert!(!page.is_dirty());
        assert_eq!(page.count, 0);
        assert_eq!(page.last_access, 0);
    }

    #[test]
    fn test_dirty_span() {
        let mut page = CachePage::new(512).unwrap();
        page.rebase(0, 32);
        assert_eq!(page.dirty_span(), None);

        page.mark_dirty_range(2, 1);
        page.mark_dirty_range(29, 1);
        assert_eq!(page.dirty_span(), Some((2, 29)));

        page.clear_dirty();
        assert_eq!(page.dirty_span(), None);
    }

    #[test]
    fn test_dirty_mask() {
        assert_eq!(dirty_mask(0, 1), 0x1);
        assert_eq!(dirty_mask(2, 3), 0b11100);
        assert_eq!(dirty_mask(0, 32), 0xFFFF_FFFF);
        // 整页写入：移位不越界
        assert_eq!(dirty_mask(0, 64), u64::MAX);
        assert_eq!(dirty_mask(63, 1), 1 << 63);
    }

    #[test]
    fn test_mark_dirty_range_accumulates() {
        let mut page = CachePage::new(512).unwrap();
        page.rebase(0, 32);
        page.mark_dirty_range(0, 8);
        assert_eq!(page.dirty_bits(), 0xFF);
        page.mark_dirty_range(4, 8);
        assert_eq!(page.dirty_bits(), 0xFFF);
    }
}
