//! 块设备能力抽象
//!
//! 缓存对底层设备只要求两个同步 I/O 契约（见 [`DiscInterface`]），
//! 外加一个介质特性查询。设备调用被视为阻塞、不可取消、在设备粒度
//! 上原子；任何失败都会原样向上传递，缓存自身从不重试。

use crate::error::Result;
use bitflags::bitflags;

bitflags! {
    /// 介质特性标志
    ///
    /// 对应 libogc `disc_io.h` 的 `FEATURE_MEDIUM_*` 常量。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DiscFeatures: u32 {
        /// 介质可读
        const CAN_READ  = 0x00000001;
        /// 介质可写
        const CAN_WRITE = 0x00000002;
    }
}

/// 磁盘接口
///
/// 实现此 trait 以提供底层扇区访问。对应 libogc 的 `DISC_INTERFACE`。
///
/// # 示例
///
/// ```rust,ignore
/// use ntfs_bcache::{DiscInterface, Result};
///
/// struct MyDisc {
///     // ...
/// }
///
/// impl DiscInterface for MyDisc {
///     fn read_sectors(&mut self, sector: u64, count: u64, buffer: &mut [u8]) -> Result<()> {
///         // 实现扇区读取
///         Ok(())
///     }
///
///     fn write_sectors(&mut self, sector: u64, count: u64, buffer: &[u8]) -> Result<()> {
///         // 实现扇区写入
///         Ok(())
///     }
/// }
/// ```
pub trait DiscInterface {
    /// 介质特性
    ///
    /// 缓存构造时要求 [`DiscFeatures::CAN_READ`]；写路径入口要求
    /// [`DiscFeatures::CAN_WRITE`]。
    fn features(&self) -> DiscFeatures {
        DiscFeatures::CAN_READ | DiscFeatures::CAN_WRITE
    }

    /// 读取扇区
    ///
    /// # 参数
    ///
    /// * `sector` - 起始扇区号
    /// * `count` - 要读取的扇区数
    /// * `buffer` - 目标缓冲区，长度必须不小于 `count * 扇区大小`
    fn read_sectors(&mut self, sector: u64, count: u64, buffer: &mut [u8]) -> Result<()>;

    /// 写入扇区
    ///
    /// # 参数
    ///
    /// * `sector` - 起始扇区号
    /// * `count` - 要写入的扇区数
    /// * `buffer` - 源缓冲区，长度必须不小于 `count * 扇区大小`
    fn write_sectors(&mut self, sector: u64, count: u64, buffer: &[u8]) -> Result<()>;
}
