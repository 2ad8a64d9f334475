//! Mock 总线（无硬件依赖）
//!
//! 在内存中模拟若干条 I2C 总线和至多一个从机设备，用于驱动层测试：
//!
//! - 挂载/拔出设备，模拟断连
//! - 注入下一次写事务的错误（瞬时错误或断连类错误）
//! - 记录每一个成功写出的包，以及句柄的打开/关闭次数
//!
//! `MockBus` 可克隆，所有克隆共享同一份内部状态，测试代码在把
//! 连接器交给会话之后仍能观察和操纵总线。

use crate::{BusAdapter, BusConnector, BusDeviceError, BusDeviceErrorKind, BusError};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct MockDevice {
    bus: u8,
    address: u16,
    status: u8,
}

#[derive(Debug)]
struct MockBusState {
    /// 存在设备节点的总线编号
    buses: BTreeSet<u8>,
    device: Option<MockDevice>,
    transact_errors: VecDeque<BusError>,
    written: Vec<Vec<u8>>,
    probes: u64,
    opened: u64,
    closed: u64,
}

/// 共享状态的 Mock 总线
#[derive(Debug, Clone)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusState>>,
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBus {
    /// 创建存在 1、2 号总线、尚未挂载设备的 Mock
    pub fn new() -> Self {
        Self::with_buses([1, 2])
    }

    pub fn with_buses(buses: impl IntoIterator<Item = u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockBusState {
                buses: buses.into_iter().collect(),
                device: None,
                transact_errors: VecDeque::new(),
                written: Vec::new(),
                probes: 0,
                opened: 0,
                closed: 0,
            })),
        }
    }

    /// 在 `bus` 上挂载就绪（状态字节 0x01）的设备
    pub fn attach(&self, bus: u8, address: u16) {
        self.attach_with_status(bus, address, 0x01);
    }

    /// 挂载设备，探测时返回 `status`
    pub fn attach_with_status(&self, bus: u8, address: u16, status: u8) {
        self.inner.lock().device = Some(MockDevice {
            bus,
            address,
            status,
        });
    }

    /// 拔出设备：之后探测返回无应答，写事务返回设备不存在
    pub fn detach(&self) {
        self.inner.lock().device = None;
    }

    /// 下一次写事务返回 `err`（可多次调用排队）
    pub fn fail_next_transact(&self, err: BusError) {
        self.inner.lock().transact_errors.push_back(err);
    }

    /// 注入一次瞬时错误（总线忙，不触发降级）
    pub fn fail_next_transient(&self) {
        self.fail_next_transact(
            BusDeviceError::new(BusDeviceErrorKind::Busy, "arbitration lost").into(),
        );
    }

    /// 注入一次断连类错误（远端 IO 错误）
    pub fn fail_next_disconnect(&self) {
        self.fail_next_transact(
            BusDeviceError::new(BusDeviceErrorKind::RemoteIo, "remote I/O error").into(),
        );
    }

    /// 所有成功写出的包（按时间顺序）
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.lock().written.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().written.len()
    }

    pub fn last_written(&self) -> Option<Vec<u8>> {
        self.inner.lock().written.last().cloned()
    }

    pub fn clear_written(&self) {
        self.inner.lock().written.clear();
    }

    pub fn probe_count(&self) -> u64 {
        self.inner.lock().probes
    }

    pub fn open_count(&self) -> u64 {
        self.inner.lock().opened
    }

    pub fn close_count(&self) -> u64 {
        self.inner.lock().closed
    }

    /// 当前未关闭的句柄数
    pub fn open_handles(&self) -> u64 {
        let state = self.inner.lock();
        state.opened - state.closed
    }
}

fn no_ack(bus: u8, address: u16) -> BusError {
    BusDeviceError::new(
        BusDeviceErrorKind::RemoteIo,
        format!("no ack from 0x{:02X} on bus {}", address, bus),
    )
    .into()
}

impl BusConnector for MockBus {
    type Adapter = MockAdapter;

    fn open(&mut self, bus: u8, _address: u16) -> Result<MockAdapter, BusError> {
        let mut state = self.inner.lock();
        if !state.buses.contains(&bus) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("/dev/i2c-{} not found", bus),
            )
            .into());
        }

        state.opened += 1;
        Ok(MockAdapter {
            bus,
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Mock 总线句柄，drop 时计入关闭次数
#[derive(Debug)]
pub struct MockAdapter {
    bus: u8,
    inner: Arc<Mutex<MockBusState>>,
}

impl BusAdapter for MockAdapter {
    fn probe(&mut self, address: u16) -> Result<u8, BusError> {
        let mut state = self.inner.lock();
        state.probes += 1;

        let device = state.device;
        match device {
            Some(dev) if dev.bus == self.bus && dev.address == address => Ok(dev.status),
            _ => Err(no_ack(self.bus, address)),
        }
    }

    fn transact(&mut self, address: u16, bytes: &[u8]) -> Result<(), BusError> {
        let mut state = self.inner.lock();

        if let Some(err) = state.transact_errors.pop_front() {
            return Err(err);
        }

        let device = state.device;
        match device {
            Some(dev) if dev.bus == self.bus && dev.address == address => {
                state.written.push(bytes.to_vec());
                Ok(())
            },
            Some(_) => Err(no_ack(self.bus, address)),
            None => Err(BusDeviceError::new(
                BusDeviceErrorKind::NoDevice,
                format!("no device on bus {}", self.bus),
            )
            .into()),
        }
    }

    fn bus(&self) -> u8 {
        self.bus
    }
}

impl Drop for MockAdapter {
    fn drop(&mut self) {
        self.inner.lock().closed += 1;
    }
}
