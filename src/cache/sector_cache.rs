//! 扇区缓存核心实现
//!
//! 对应原 C 驱动的 `NTFS_CACHE` 结构和 `_NTFS_cache_*` 函数族。
//!
//! # 替换与写回策略
//!
//! 未命中时，一趟线性扫描同时选出受害槽位（空闲优先，否则最小访问刻，
//! 平局取最小下标）。驱逐保证：
//!
//! - 每次未命中至多**一次**设备读（写分配会省去将被完全覆盖的装载）
//! - 每次驱逐至多**一次**设备写（覆盖脏位图两端的连续区间，无论位图
//!   多么碎片化）
//!
//! # 故障语义
//!
//! 缓存从不重试。填充读失败会清空受害槽位（此时尚未提交任何内容）；
//! 写回失败会**保留**脏位图，后续的 `flush` 或驱逐可以重试，调用者也
//! 可以用 `invalidate` 放弃数据。

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use super::page::CachePage;
use crate::consts::{BUFFER_ALIGN, MAX_SECTORS_PER_PAGE, MIN_CACHE_PAGES, MIN_SECTORS_PER_PAGE};
use crate::disc::{DiscFeatures, DiscInterface};
use crate::error::{Error, ErrorKind, Result};

/// 进程级访问计数器
///
/// 刻度值只在单个缓存内部比较，进程级共享不影响局部的 LRU 序。
/// 卷锁串行化了缓存访问，这里的原子性只为满足 `static` 的要求。
static ACCESS_COUNTER: AtomicU64 = AtomicU64::new(0);

fn access_time() -> u64 {
    ACCESS_COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 旁路批量读次数
    pub bypass_reads: u64,
    /// 旁路批量写次数
    pub bypass_writes: u64,
    /// 脏区间写回次数
    pub writebacks: u64,
    /// 当前带脏位的页数
    pub dirty_pages: usize,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// NTFS 扇区缓存
///
/// 在 NTFS 卷驱动与块设备之间缓冲扇区。页表为固定槽位序列，每个槽位
/// 持有一页扇区、一个 `u64` 脏位图和一块 32 字节对齐的缓冲区。
///
/// 缓存拥有其设备；[`NtfsCache::device`] 与 [`NtfsCache::device_mut`]
/// 暴露底层设备。析构时尽力冲刷并忽略失败，需要看到冲刷结果的调用者
/// 应先显式调用 [`NtfsCache::flush`] 或 [`NtfsCache::invalidate`]。
#[derive(Debug)]
pub struct NtfsCache<D: DiscInterface> {
    /// 底层设备
    device: D,
    /// 构造时捕获的介质特性
    features: DiscFeatures,
    /// 分区结束扇区（不含）
    end_of_partition: u64,
    /// 每页扇区数
    sectors_per_page: u64,
    /// 每扇区字节数
    bytes_per_sector: usize,
    /// 页表：物理连续的固定槽位序列
    pages: Vec<CachePage>,
    /// 统计信息
    stats: CacheStats,
}

impl<D: DiscInterface> NtfsCache<D> {
    /// 创建新的扇区缓存
    ///
    /// `page_count` 被钳制到不小于 [`MIN_CACHE_PAGES`]；`sectors_per_page`
    /// 被钳制到 `[MIN_SECTORS_PER_PAGE, MAX_SECTORS_PER_PAGE]`。钳制前为
    /// 零的参数直接拒绝。
    ///
    /// # 参数
    ///
    /// * `device` - 底层块设备，必须可读
    /// * `page_count` - 缓存页数
    /// * `sectors_per_page` - 每页扇区数
    /// * `end_of_partition` - 分区结束扇区（不含）
    /// * `bytes_per_sector` - 设备原生扇区大小（字节）
    ///
    /// # 错误
    ///
    /// 参数为零返回 `InvalidInput`；介质不可读返回 `Unsupported`；
    /// 槽位缓冲区分配失败返回 `OutOfMemory`。
    pub fn new(
        device: D,
        page_count: usize,
        sectors_per_page: u64,
        end_of_partition: u64,
        bytes_per_sector: usize,
    ) -> Result<Self> {
        if page_count == 0 || sectors_per_page == 0 || bytes_per_sector == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "cache geometry must be non-zero",
            ));
        }

        let features = device.features();
        if !features.contains(DiscFeatures::CAN_READ) {
            return Err(Error::new(ErrorKind::Unsupported, "medium cannot be read"));
        }

        let page_count = page_count.max(MIN_CACHE_PAGES);
        let sectors_per_page = sectors_per_page.clamp(MIN_SECTORS_PER_PAGE, MAX_SECTORS_PER_PAGE);
        let buffer_len = sectors_per_page as usize * bytes_per_sector;

        let mut pages = Vec::with_capacity(page_count);
        for _ in 0..page_count {
            pages.push(CachePage::new(buffer_len)?);
        }

        Ok(Self {
            device,
            features,
            end_of_partition,
            sectors_per_page,
            bytes_per_sector,
            pages,
            stats: CacheStats::default(),
        })
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 缓存页数
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// 每页扇区数（钳制后）
    pub fn sectors_per_page(&self) -> u64 {
        self.sectors_per_page
    }

    /// 每扇区字节数
    pub fn bytes_per_sector(&self) -> usize {
        self.bytes_per_sector
    }

    /// 分区结束扇区（不含）
    pub fn end_of_partition(&self) -> u64 {
        self.end_of_partition
    }

    /// 当前带脏位的页数
    pub fn dirty_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_dirty()).count()
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.dirty_pages = self.dirty_pages();
        stats
    }

    /// 取得覆盖 `sector` 的槽位下标；未命中时换入
    ///
    /// 命中扫描与受害者选择在同一趟线性扫描中完成。未命中时先写回
    /// 受害槽位的脏区间，再把槽位重定位到包含 `sector` 的页并填充。
    ///
    /// `write` 为真表示调用者即将从 `sector` 起覆盖 `num_sectors` 个
    /// 扇区：被完全覆盖的装载会被省去（写分配优化），每次未命中至多
    /// 发出一次设备读。
    ///
    /// # 错误
    ///
    /// 写回失败时槽位原样保留（脏位完整）；填充读失败时槽位清空。
    fn get_page(&mut self, sector: u64, num_sectors: u64, write: bool) -> Result<usize> {
        if sector >= self.end_of_partition {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "sector beyond end of partition",
            ));
        }

        let mut hit = None;
        let mut victim = 0usize;
        let mut oldest = u64::MAX;
        let mut found_free = false;

        for (i, page) in self.pages.iter().enumerate() {
            if page.contains(sector) {
                hit = Some(i);
                break;
            }

            if !found_free {
                if page.is_free() {
                    found_free = true;
                    victim = i;
                } else if page.last_access < oldest {
                    victim = i;
                    oldest = page.last_access;
                }
            }
        }

        if let Some(i) = hit {
            self.stats.hits += 1;
            self.pages[i].last_access = access_time();
            log::trace!("[CACHE] sector {:#x} hit in slot {}", sector, i);
            return Ok(i);
        }

        self.stats.misses += 1;
        log::debug!("[CACHE] sector {:#x} miss, victim slot {}", sector, victim);

        // 驱逐前写回受害槽位的脏区间；失败则槽位原样保留，调用者可重试
        if !found_free {
            self.writeback(victim)?;
        }

        let spp = self.sectors_per_page;
        let base = (sector / spp) * spp;
        let count = spp.min(self.end_of_partition - base);
        let local = sector - base;
        let num = num_sectors.min(count - local);

        // 装载窗口：默认整页；写分配时省去将被完全覆盖的部分
        let mut read_lo = 0u64;
        let mut read_hi = count;
        if write {
            if local == 0 && num == count {
                // 整页都会被覆盖，完全不需要装载
                let page = &mut self.pages[victim];
                page.rebase(base, count);
                page.last_access = access_time();
                return Ok(victim);
            } else if local == 0 {
                read_lo = num;
            } else if local + num == count {
                read_hi = local;
            }
        }

        let bps = self.bytes_per_sector;
        let Self { pages, device, .. } = self;
        let page = &mut pages[victim];
        page.rebase(base, count);

        let lo = read_lo as usize * bps;
        let hi = read_hi as usize * bps;
        if let Err(e) = device.read_sectors(base + read_lo, read_hi - read_lo, &mut page.buffer[lo..hi]) {
            // 尚未提交任何内容，清空槽位是安全的
            page.reset();
            log::error!("[CACHE] populate read failed at sector {:#x}", base + read_lo);
            return Err(e);
        }

        page.last_access = access_time();
        Ok(victim)
    }

    /// 写回槽位的脏区间并清除脏位图
    ///
    /// 对覆盖 `[最低脏位, 最高脏位]` 的连续区间发出单次设备写；两端
    /// 之间的干净扇区一并写出，换取一次长传输。失败时脏位图原样保留。
    fn writeback(&mut self, index: usize) -> Result<()> {
        let bps = self.bytes_per_sector;
        let Self { pages, device, stats, .. } = self;
        let page = &mut pages[index];

        let Some((first, last)) = page.dirty_span() else {
            return Ok(());
        };

        let start = first as usize * bps;
        let end = (last + 1) as usize * bps;
        device.write_sectors(page.base_sector() + first, last - first + 1, &page.buffer[start..end])?;

        page.clear_dirty();
        stats.writebacks += 1;
        log::debug!(
            "[CACHE] wrote back sectors [{:#x}, {:#x}] from slot {}",
            page.base_sector() + first,
            page.base_sector() + last,
            index
        );
        Ok(())
    }

    /// 在非空闲槽位中找与 `[sector, sector + num_sectors)` 相交、
    /// 基址最小的页，返回其基址
    ///
    /// 旁路路径用它决定有多少扇区可以不经缓存直达设备。
    fn find_intersecting(&self, sector: u64, num_sectors: u64) -> Option<u64> {
        let mut lowest = None;

        for page in &self.pages {
            if page.is_free() {
                continue;
            }
            let base = page.base_sector();
            let intersects = if sector > base {
                sector - base < page.count
            } else {
                base - sector < num_sectors
            };
            if intersects && lowest.map_or(true, |b| base < b) {
                lowest = Some(base);
            }
        }

        lowest
    }

    /// 读取若干扇区
    ///
    /// 对齐的整页批量读（缓冲区 32 字节对齐且起始扇区页对齐）在不与
    /// 任何缓存页相交时绕过缓存直达设备；其余部分经缓存逐页拷贝。
    ///
    /// # 参数
    ///
    /// * `sector` - 起始扇区号
    /// * `num_sectors` - 扇区数
    /// * `buffer` - 目标缓冲区，长度必须不小于 `num_sectors * 每扇区字节数`
    pub fn read_sectors(&mut self, mut sector: u64, mut num_sectors: u64, buffer: &mut [u8]) -> Result<()> {
        let bps = self.bytes_per_sector;
        if (buffer.len() as u64) < num_sectors * bps as u64 {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer too small for sectors"));
        }

        let mut offset = 0usize;
        while num_sectors > 0 {
            if (buffer[offset..].as_ptr() as usize) % BUFFER_ALIGN == 0
                && sector % self.sectors_per_page == 0
            {
                let chunk = match self.find_intersecting(sector, num_sectors) {
                    // 只旁路整页，绝不产生不完整的尾页
                    None => (num_sectors / self.sectors_per_page) * self.sectors_per_page,
                    Some(base) if base > sector => base - sector,
                    Some(_) => 0,
                };

                if chunk > 0 {
                    let len = chunk as usize * bps;
                    self.device.read_sectors(sector, chunk, &mut buffer[offset..offset + len])?;
                    self.stats.bypass_reads += 1;
                    log::trace!("[CACHE] bypass read of {} sectors at {:#x}", chunk, sector);

                    offset += len;
                    sector += chunk;
                    num_sectors -= chunk;
                    continue;
                }
            }

            let index = self.get_page(sector, num_sectors, false)?;
            let page = &self.pages[index];
            let local = sector - page.base_sector();
            let chunk = (page.count - local).min(num_sectors);

            let start = local as usize * bps;
            let len = chunk as usize * bps;
            buffer[offset..offset + len].copy_from_slice(&page.buffer[start..start + len]);

            offset += len;
            sector += chunk;
            num_sectors -= chunk;
        }

        Ok(())
    }

    /// 写入若干扇区
    ///
    /// 旁路条件与 [`NtfsCache::read_sectors`] 对称；经缓存的部分以写
    /// 分配方式换入页并标记对应脏位。
    ///
    /// # 参数
    ///
    /// * `sector` - 起始扇区号
    /// * `num_sectors` - 扇区数
    /// * `buffer` - 源缓冲区，长度必须不小于 `num_sectors * 每扇区字节数`
    pub fn write_sectors(&mut self, mut sector: u64, mut num_sectors: u64, buffer: &[u8]) -> Result<()> {
        if !self.features.contains(DiscFeatures::CAN_WRITE) {
            return Err(Error::new(ErrorKind::Unsupported, "medium cannot be written"));
        }
        let bps = self.bytes_per_sector;
        if (buffer.len() as u64) < num_sectors * bps as u64 {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer too small for sectors"));
        }

        let mut offset = 0usize;
        while num_sectors > 0 {
            if (buffer[offset..].as_ptr() as usize) % BUFFER_ALIGN == 0
                && sector % self.sectors_per_page == 0
            {
                let chunk = match self.find_intersecting(sector, num_sectors) {
                    None => (num_sectors / self.sectors_per_page) * self.sectors_per_page,
                    Some(base) if base > sector => base - sector,
                    Some(_) => 0,
                };

                if chunk > 0 {
                    let len = chunk as usize * bps;
                    self.device.write_sectors(sector, chunk, &buffer[offset..offset + len])?;
                    self.stats.bypass_writes += 1;
                    log::trace!("[CACHE] bypass write of {} sectors at {:#x}", chunk, sector);

                    offset += len;
                    sector += chunk;
                    num_sectors -= chunk;
                    continue;
                }
            }

            let index = self.get_page(sector, num_sectors, true)?;
            let page = &mut self.pages[index];
            let local = sector - page.base_sector();
            let chunk = (page.count - local).min(num_sectors);

            let start = local as usize * bps;
            let len = chunk as usize * bps;
            page.buffer[start..start + len].copy_from_slice(&buffer[offset..offset + len]);
            page.mark_dirty_range(local, chunk);

            offset += len;
            sector += chunk;
            num_sectors -= chunk;
        }

        Ok(())
    }

    /// 从扇区内读取部分数据
    ///
    /// 换入包含 `sector` 的页后，从扇区内偏移 `offset` 处拷贝
    /// `buffer.len()` 字节。
    ///
    /// 前置条件：`offset + buffer.len()` 不得超过每扇区字节数。
    pub fn read_partial(&mut self, buffer: &mut [u8], sector: u64, offset: usize) -> Result<()> {
        if offset + buffer.len() > self.bytes_per_sector {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "partial access crosses sector boundary",
            ));
        }

        let index = self.get_page(sector, 1, false)?;
        let page = &self.pages[index];
        let local = (sector - page.base_sector()) as usize;

        let start = local * self.bytes_per_sector + offset;
        buffer.copy_from_slice(&page.buffer[start..start + buffer.len()]);
        Ok(())
    }

    /// 向扇区内写入部分数据
    ///
    /// 页以普通方式换入（周围字节必须保持有效），拷贝后把该扇区的
    /// 脏位置位。前置条件同 [`NtfsCache::read_partial`]。
    pub fn write_partial(&mut self, buffer: &[u8], sector: u64, offset: usize) -> Result<()> {
        if !self.features.contains(DiscFeatures::CAN_WRITE) {
            return Err(Error::new(ErrorKind::Unsupported, "medium cannot be written"));
        }
        if offset + buffer.len() > self.bytes_per_sector {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "partial access crosses sector boundary",
            ));
        }

        let index = self.get_page(sector, 1, false)?;
        let page = &mut self.pages[index];
        let local = sector - page.base_sector();

        let start = local as usize * self.bytes_per_sector + offset;
        page.buffer[start..start + buffer.len()].copy_from_slice(buffer);
        page.mark_dirty_range(local, 1);
        Ok(())
    }

    /// 先清零整个扇区，再写入部分数据
    ///
    /// 该扇区即将被完全覆盖，因此页以写分配方式换入（不预读这个
    /// 扇区本身所在的装载窗口）。前置条件同 [`NtfsCache::read_partial`]。
    pub fn erase_write_partial(&mut self, buffer: &[u8], sector: u64, offset: usize) -> Result<()> {
        if !self.features.contains(DiscFeatures::CAN_WRITE) {
            return Err(Error::new(ErrorKind::Unsupported, "medium cannot be written"));
        }
        if offset + buffer.len() > self.bytes_per_sector {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "partial access crosses sector boundary",
            ));
        }

        let index = self.get_page(sector, 1, true)?;
        let page = &mut self.pages[index];
        let local = sector - page.base_sector();

        let sector_start = local as usize * self.bytes_per_sector;
        page.buffer[sector_start..sector_start + self.bytes_per_sector].fill(0);
        page.buffer[sector_start + offset..sector_start + offset + buffer.len()].copy_from_slice(buffer);
        page.mark_dirty_range(local, 1);
        Ok(())
    }

    /// 读取一个小端序整数
    ///
    /// `width` 只接受 1、2、4 字节。
    pub fn read_le(&mut self, sector: u64, offset: usize, width: usize) -> Result<u32> {
        if !matches!(width, 1 | 2 | 4) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "little-endian width must be 1, 2 or 4",
            ));
        }

        let mut buf = [0u8; 4];
        self.read_partial(&mut buf[..width], sector, offset)?;

        Ok(match width {
            1 => buf[0] as u32,
            2 => u16::from_le_bytes([buf[0], buf[1]]) as u32,
            _ => u32::from_le_bytes(buf),
        })
    }

    /// 写入一个小端序整数
    ///
    /// `width` 只接受 1、2、4 字节。
    pub fn write_le(&mut self, value: u32, sector: u64, offset: usize, width: usize) -> Result<()> {
        if !matches!(width, 1 | 2 | 4) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "little-endian width must be 1, 2 or 4",
            ));
        }

        let buf = value.to_le_bytes();
        self.write_partial(&buf[..width], sector, offset)
    }

    /// 读取一个完整扇区
    ///
    /// [`NtfsCache::read_partial`] 在偏移 0 处的便捷包装。`buffer`
    /// 长度必须恰好为一个扇区。
    pub fn read_sector(&mut self, buffer: &mut [u8], sector: u64) -> Result<()> {
        if buffer.len() != self.bytes_per_sector {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer must be exactly one sector",
            ));
        }
        self.read_partial(buffer, sector, 0)
    }

    /// 写入一个完整扇区
    ///
    /// [`NtfsCache::write_partial`] 在偏移 0 处的便捷包装。`buffer`
    /// 长度必须恰好为一个扇区。
    pub fn write_sector(&mut self, buffer: &[u8], sector: u64) -> Result<()> {
        if buffer.len() != self.bytes_per_sector {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer must be exactly one sector",
            ));
        }
        self.write_partial(buffer, sector, 0)
    }

    /// 把所有脏扇区写回设备并清除脏位
    ///
    /// 每个脏槽位执行一次连续区间写回。首个失败立即返回，该槽位及
    /// 其后的槽位保持脏位不变，可以重试。
    pub fn flush(&mut self) -> Result<()> {
        for index in 0..self.pages.len() {
            self.writeback(index)?;
        }
        Ok(())
    }

    /// 冲刷后把所有槽位复位为空闲
    ///
    /// 无论冲刷是否成功，页表都会被复位（放弃语义，缓冲区保留复用）；
    /// 返回值传达冲刷结果，失败意味着有脏数据被丢弃。
    pub fn invalidate(&mut self) -> Result<()> {
        let flushed = self.flush();

        for page in &mut self.pages {
            page.reset();
        }
        log::debug!("[CACHE] invalidated all {} slots", self.pages.len());

        flushed
    }
}

impl<D: DiscInterface> Drop for NtfsCache<D> {
    fn drop(&mut self) {
        if self.flush().is_err() {
            log::warn!("[CACHE] flush failed during drop, dirty sectors were lost");
        }
    }
}
