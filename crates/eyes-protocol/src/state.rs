//! 眼球状态定义
//!
//! 共享内存中每个字段都以 `i32` 原始编码存放（生产者的原生布局）。
//! 这里的枚举只用于让写入方表达意图；编码时不校验取值含义，
//! 只按位宽截断。

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constants::DEFAULT_PUPIL;

/// 眼球状态（瞳孔反应）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum EyeCondition {
    #[default]
    Normal = 0,
    Obtunded = 1,
    Miotic = 2,
    Dilated = 3,
}

/// 眼睑状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum LidState {
    #[default]
    Open = 0,
    Closed = 1,
    Partial = 2,
}

/// 眼球运动模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum Movement {
    #[default]
    Normal = 0,
    InfrequentSlow = 1,
    None = 2,
}

/// 注视方向（4 bit 编码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum Gaze {
    #[default]
    Center = 0,
    Right = 1,
    Left = 2,
    Up = 3,
    Down = 4,
    UpRight = 5,
    UpLeft = 6,
    DownRight = 7,
    DownLeft = 8,
}

/// 眨眼模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum BlinkPattern {
    #[default]
    Normal = 0,
    InfrequentSlow = 1,
    PartialInfrequent = 2,
    None = 3,
}

/// 单侧眼球状态（原始编码）
///
/// 字段与共享内存中的 `right_*` / `left_*` 一一对应。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EyeSide {
    /// `EyeCondition` 编码
    pub state: i32,
    /// `LidState` 编码
    pub lid: i32,
    /// `Movement` 编码
    pub movement: i32,
    /// `Gaze` 编码
    pub position: i32,
    /// `BlinkPattern` 编码
    pub blink: i32,
    /// 瞳孔大小（%，有效范围 5-90）
    pub pupil: i32,
}

impl Default for EyeSide {
    /// 守护进程启动时写入的默认值：全部 normal/open/center，瞳孔 70%
    fn default() -> Self {
        Self {
            state: EyeCondition::Normal.into(),
            lid: LidState::Open.into(),
            movement: Movement::Normal.into(),
            position: Gaze::Center.into(),
            blink: BlinkPattern::Normal.into(),
            pupil: DEFAULT_PUPIL,
        }
    }
}

impl EyeSide {
    pub fn with_condition(mut self, condition: EyeCondition) -> Self {
        self.state = condition.into();
        self
    }

    pub fn with_lid(mut self, lid: LidState) -> Self {
        self.lid = lid.into();
        self
    }

    pub fn with_movement(mut self, movement: Movement) -> Self {
        self.movement = movement.into();
        self
    }

    pub fn with_gaze(mut self, gaze: Gaze) -> Self {
        self.position = gaze.into();
        self
    }

    pub fn with_blink(mut self, blink: BlinkPattern) -> Self {
        self.blink = blink.into();
        self
    }

    pub fn with_pupil(mut self, pupil: i32) -> Self {
        self.pupil = pupil;
        self
    }
}

/// 左右眼完整状态（12 个字段）
///
/// 同时用作"上次成功发送"的快照，比较即变化检测。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EyesState {
    pub right: EyeSide,
    pub left: EyeSide,
}

impl EyesState {
    pub fn new(right: EyeSide, left: EyeSide) -> Self {
        Self { right, left }
    }

    /// 两眼使用相同状态
    pub fn both(side: EyeSide) -> Self {
        Self {
            right: side,
            left: side,
        }
    }
}
