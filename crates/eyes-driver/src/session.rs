//! 设备会话
//!
//! 持有总线句柄与从机地址，负责发现眼球控制器并以"构包 + 发送"
//! 的原子操作写出命令包。
//!
//! `present` 与句柄一一对应：持有句柄即 present。句柄以
//! `Option<Adapter>` 存放，丢弃即关闭，因此无论是降级、重新扫描
//! 还是会话析构，每个句柄都恰好关闭一次。

use crate::error::{DriverError, SendError};
use eyes_bus::{BusAdapter, BusConnector};
use eyes_protocol::{CommandPacket, EYES_I2C_ADDR, EYES_READY, EyesState, PUPIL_MAX, PUPIL_MIN};
use eyes_shm::{BusGuard, SharedState};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// 按顺序扫描的候选总线编号
    pub buses: Vec<u8>,
    /// 7 位从机地址
    pub address: u16,
    /// 探测读返回该值才视为就绪
    pub ready_sentinel: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buses: vec![1, 2],
            address: EYES_I2C_ADDR,
            ready_sentinel: EYES_READY,
        }
    }
}

impl SessionConfig {
    /// 扫描 `first..=last` 号总线
    pub fn with_bus_range(mut self, first: u8, last: u8) -> Self {
        self.buses = (first..=last).collect();
        self
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        if self.buses.is_empty() {
            return Err(DriverError::InvalidConfig("no candidate buses".into()));
        }
        if self.address > 0x7F {
            return Err(DriverError::InvalidConfig(format!(
                "address 0x{:02X} is not a 7-bit I2C address",
                self.address
            )));
        }
        Ok(())
    }
}

/// 眼球控制器会话
pub struct DeviceSession<C: BusConnector, S: SharedState> {
    connector: C,
    shared: Arc<S>,
    config: SessionConfig,
    bus: Option<C::Adapter>,
}

impl<C: BusConnector, S: SharedState> DeviceSession<C, S> {
    /// 创建会话，不做探测
    pub fn new(connector: C, shared: Arc<S>, config: SessionConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            connector,
            shared,
            config,
            bus: None,
        })
    }

    /// 扫描候选总线，找到就绪的控制器后保留句柄
    ///
    /// 未找到不是错误，返回 `false`。
    pub fn discover(&mut self) -> bool {
        if self.bus.take().is_some() {
            debug!("Released previous bus handle before rescanning");
        }

        let address = self.config.address;
        for &bus in &self.config.buses {
            let mut adapter = match self.connector.open(bus, address) {
                Ok(adapter) => adapter,
                Err(e) => {
                    trace!("Bus {}: open failed: {}", bus, e);
                    continue;
                },
            };

            let status = {
                let _guard = match BusGuard::acquire(&*self.shared) {
                    Ok(guard) => guard,
                    Err(e) => {
                        warn!("Bus {}: skipping candidate, bus lock failed: {}", bus, e);
                        continue;
                    },
                };
                adapter.probe(address)
            };

            match status {
                Ok(byte) if byte == self.config.ready_sentinel => {
                    info!("Eyes found on bus {} at 0x{:02X}", bus, address);
                    self.bus = Some(adapter);
                    return true;
                },
                Ok(byte) => trace!("Bus {}: device not ready (status 0x{:02X})", bus, byte),
                Err(e) => trace!("Bus {}: probe failed: {}", bus, e),
            }
        }

        false
    }

    /// 构造完整状态包并发送
    pub fn send_full_state(&mut self, state: &EyesState) -> Result<(), SendError> {
        for (side, pupil) in [("right", state.right.pupil), ("left", state.left.pupil)] {
            if !(PUPIL_MIN..=PUPIL_MAX).contains(&pupil) {
                debug!(
                    "{} pupil {} outside {}-{}, clamped",
                    side, pupil, PUPIL_MIN, PUPIL_MAX
                );
            }
        }

        self.transmit(CommandPacket::full(state))
    }

    /// 只发送眼球状态字节，其余属性保持不变
    pub fn send_eye_state(&mut self, right: i32, left: i32) -> Result<(), SendError> {
        self.transmit(CommandPacket::eye_state_only(right, left))
    }

    fn transmit(&mut self, mut packet: CommandPacket) -> Result<(), SendError> {
        let Some(adapter) = self.bus.as_mut() else {
            return Err(SendError::NotPresent);
        };
        let bytes = *packet.finalize();

        let result = {
            let _guard = BusGuard::acquire(&*self.shared).map_err(SendError::Lock)?;
            adapter.transact(self.config.address, &bytes)
        };

        match result {
            Ok(()) => {
                debug!("Sent eyes packet {:02X?}", bytes);
                Ok(())
            },
            Err(e) if e.is_disconnect() => {
                warn!("Eyes lost on bus {}: {}", adapter.bus(), e);
                self.bus = None;
                Err(SendError::Transport(e))
            },
            Err(e) => Err(SendError::Transport(e)),
        }
    }

    pub fn is_present(&self) -> bool {
        self.bus.is_some()
    }

    /// 当前持有句柄的总线编号
    pub fn active_bus(&self) -> Option<u8> {
        self.bus.as_ref().map(|bus| bus.bus())
    }

    pub fn shared(&self) -> &Arc<S> {
        &self.shared
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
