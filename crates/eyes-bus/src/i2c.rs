//! Linux i2c-dev 适配器实现
//!
//! 通过 `/dev/i2c-N` 字符设备访问总线：
//! - `I2C_SLAVE` ioctl 绑定从机地址
//! - `I2C_RDWR` ioctl 发出单消息事务（读 1 字节探测 / 整包写）
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - **权限要求**：通常需要 `i2c` 组权限或 `sudo`

use crate::{BusAdapter, BusConnector, BusError};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::trace;

// <linux/i2c-dev.h>
const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_RDWR: libc::c_ulong = 0x0707;

// <linux/i2c.h>
const I2C_M_RD: u16 = 0x0001;

/// `struct i2c_msg`
#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

/// `struct i2c_rdwr_ioctl_data`
#[repr(C)]
struct I2cRdwrIoctlData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

/// i2c-dev 总线打开器
///
/// # 示例
///
/// ```no_run
/// use eyes_bus::{BusAdapter, BusConnector, LinuxI2cConnector};
///
/// let mut connector = LinuxI2cConnector::new();
/// let mut bus = connector.open(1, 0x42).unwrap();
/// let status = bus.probe(0x42).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct LinuxI2cConnector {
    /// 设备节点目录（默认 `/dev`）
    dev_dir: PathBuf,
}

impl Default for LinuxI2cConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxI2cConnector {
    pub fn new() -> Self {
        Self::with_dev_dir("/dev")
    }

    pub fn with_dev_dir(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
        }
    }

    /// `bus` 号总线对应的设备节点路径
    pub fn device_path(&self, bus: u8) -> PathBuf {
        self.dev_dir.join(format!("i2c-{}", bus))
    }
}

impl BusConnector for LinuxI2cConnector {
    type Adapter = LinuxI2cAdapter;

    fn open(&mut self, bus: u8, address: u16) -> Result<LinuxI2cAdapter, BusError> {
        let path = self.device_path(bus);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let ret = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE as _,
                address as libc::c_ulong,
            )
        };
        if ret < 0 {
            // file 在此处 drop，句柄随之关闭
            return Err(io::Error::last_os_error().into());
        }

        trace!("Opened {} bound to 0x{:02X}", path.display(), address);
        Ok(LinuxI2cAdapter { file, path, bus })
    }
}

/// 已打开的 i2c-dev 句柄
///
/// 文件描述符随 `File` 一起在 drop 时关闭。
#[derive(Debug)]
pub struct LinuxI2cAdapter {
    file: File,
    path: PathBuf,
    bus: u8,
}

impl LinuxI2cAdapter {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rdwr(&mut self, msg: &mut I2cMsg) -> Result<(), BusError> {
        let mut data = I2cRdwrIoctlData {
            msgs: msg as *mut I2cMsg,
            nmsgs: 1,
        };

        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                I2C_RDWR as _,
                &mut data as *mut I2cRdwrIoctlData,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }
}

impl BusAdapter for LinuxI2cAdapter {
    fn probe(&mut self, address: u16) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        let mut msg = I2cMsg {
            addr: address,
            flags: I2C_M_RD,
            len: buf.len() as u16,
            buf: buf.as_mut_ptr(),
        };

        self.rdwr(&mut msg)?;
        Ok(buf[0])
    }

    fn transact(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError> {
        // 写消息内核只读取 buf，不会写回
        let mut msg = I2cMsg {
            addr: address,
            flags: 0,
            len: bytes.len() as u16,
            buf: bytes.as_ptr() as *mut u8,
        };

        self.rdwr(&mut msg)
    }

    fn bus(&self) -> u8 {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path() {
        let connector = LinuxI2cConnector::new();
        assert_eq!(connector.device_path(1), PathBuf::from("/dev/i2c-1"));

        let connector = LinuxI2cConnector::with_dev_dir("/tmp/fake-dev");
        assert_eq!(
            connector.device_path(2),
            PathBuf::from("/tmp/fake-dev/i2c-2")
        );
    }

    #[test]
    fn test_open_missing_bus_fails() {
        let dir = std::env::temp_dir().join("eyes-bus-no-such-dev");
        let mut connector = LinuxI2cConnector::with_dev_dir(&dir);

        let err = connector.open(7, 0x42).unwrap_err();
        match err {
            BusError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_ioctl_layout() {
        // 与内核结构体布局一致
        assert_eq!(
            std::mem::size_of::<I2cMsg>(),
            if cfg!(target_pointer_width = "64") { 16 } else { 12 }
        );
        assert_eq!(
            std::mem::align_of::<I2cRdwrIoctlData>(),
            std::mem::align_of::<usize>()
        );
    }
}
