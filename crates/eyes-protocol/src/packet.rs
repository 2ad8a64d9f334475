//! 命令包编码
//!
//! 每个字段字节都由一个纯函数编码，可单独测试：
//! - [`encode_standard_pair`]: eye-state / lid / move / blink（左右各 2 bit）
//! - [`encode_position`]: 单侧注视方向（4 bit）
//! - [`encode_pupil`]: 单侧瞳孔大小（7 bit，5-90 映射到 0-85）
//!
//! 输入只按位宽截断，不校验取值含义。

use bilge::prelude::*;

use crate::ProtocolError;
use crate::constants::*;
use crate::state::EyesState;

/// 标准字节位域：`[setR(1)|valR(2)|x|setL(1)|valL(2)|x]`
///
/// - Bit 0: 保留
/// - Bit 1-2: 左眼取值
/// - Bit 3: 左眼生效
/// - Bit 4: 保留
/// - Bit 5-6: 右眼取值
/// - Bit 7: 右眼生效
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct StandardPairByte {
    pub pad0: u1,
    pub left: u2,
    pub apply_left: bool,
    pub pad4: u1,
    pub right: u2,
    pub apply_right: bool,
}

/// 注视方向字节位域：`[set(1)|pos(4)|x(3)]`
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct PositionByte {
    pub pad: u3,     // Bit 0-2: 保留
    pub code: u4,    // Bit 3-6: 方向编码
    pub apply: bool, // Bit 7: 生效
}

/// 瞳孔字节位域：`[set(1)|pupil(7)]`
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct PupilByte {
    pub size: u7,    // Bit 0-6: 瞳孔大小 - 5
    pub apply: bool, // Bit 7: 生效
}

/// 编码左右眼的 2 bit 取值（两侧生效位均置 1）
pub fn encode_standard_pair(right: i32, left: i32) -> u8 {
    let mut byte = StandardPairByte::default();
    byte.set_apply_right(true);
    byte.set_right(u2::new((right & 0x03) as u8));
    byte.set_apply_left(true);
    byte.set_left(u2::new((left & 0x03) as u8));
    u8::from(byte)
}

/// 编码单侧注视方向（生效位置 1）
pub fn encode_position(code: i32) -> u8 {
    let mut byte = PositionByte::default();
    byte.set_apply(true);
    byte.set_code(u4::new((code & 0x0F) as u8));
    u8::from(byte)
}

/// 瞳孔大小缩放：钳位到 5-90，减 5，再钳位到 0-85
///
/// 越界输入被静默钳位，不会回绕到相邻位。
pub fn scale_pupil(pupil: i32) -> u8 {
    let scaled = pupil.clamp(PUPIL_MIN, PUPIL_MAX) - PUPIL_MIN;
    scaled.clamp(0, PUPIL_ENCODED_MAX as i32) as u8
}

/// 编码单侧瞳孔大小（生效位置 1）
pub fn encode_pupil(pupil: i32) -> u8 {
    let mut byte = PupilByte::default();
    byte.set_apply(true);
    byte.set_size(u7::new(scale_pupil(pupil)));
    u8::from(byte)
}

/// 解码瞳孔字节，返回百分比；生效位未置位时返回 `None`
pub fn decode_pupil(byte: u8) -> Option<i32> {
    let byte = PupilByte::from(byte);
    byte.apply().then(|| byte.size().value() as i32 + PUPIL_MIN)
}

/// 校验和：bytes[1..=10] 逐字节异或
pub fn checksum(packet: &[u8; EYES_PACKET_SIZE]) -> u8 {
    packet[PKT_EYESTATE..=PKT_RESERVED]
        .iter()
        .fold(0u8, |acc, b| acc ^ b)
}

/// 12 字节命令包
///
/// 构造函数产出的包已带校验和；发送前通过 [`CommandPacket::finalize`]
/// 再次计算，保证发出的校验和永远与负载一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPacket {
    bytes: [u8; EYES_PACKET_SIZE],
}

impl CommandPacket {
    fn with_header() -> Self {
        let mut bytes = [0u8; EYES_PACKET_SIZE];
        bytes[PKT_HEADER] = EYES_CMD_HEADER;
        Self { bytes }
    }

    /// 完整状态包（全部字段生效）
    pub fn full(state: &EyesState) -> Self {
        let (r, l) = (&state.right, &state.left);

        let mut packet = Self::with_header();
        packet.bytes[PKT_EYESTATE] = encode_standard_pair(r.state, l.state);
        packet.bytes[PKT_LID] = encode_standard_pair(r.lid, l.lid);
        packet.bytes[PKT_MOVE] = encode_standard_pair(r.movement, l.movement);
        packet.bytes[PKT_POS_R] = encode_position(r.position);
        packet.bytes[PKT_POS_L] = encode_position(l.position);
        packet.bytes[PKT_BLINK] = encode_standard_pair(r.blink, l.blink);
        packet.bytes[PKT_PUPIL_R] = encode_pupil(r.pupil);
        packet.bytes[PKT_PUPIL_L] = encode_pupil(l.pupil);
        // Byte 2, 10: 保留，已初始化为 0

        packet.finalize();
        packet
    }

    /// 仅眼球状态包
    ///
    /// 其余字节为 0（生效位未置位），控制器保持对应属性不变。
    pub fn eye_state_only(right: i32, left: i32) -> Self {
        let mut packet = Self::with_header();
        packet.bytes[PKT_EYESTATE] = encode_standard_pair(right, left);
        packet.finalize();
        packet
    }

    /// 从抓取到的原始字节解析（校验长度、包头和校验和）
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; EYES_PACKET_SIZE] =
            raw.try_into().map_err(|_| ProtocolError::InvalidLength {
                expected: EYES_PACKET_SIZE,
                actual: raw.len(),
            })?;

        if bytes[PKT_HEADER] != EYES_CMD_HEADER {
            return Err(ProtocolError::InvalidHeader {
                header: bytes[PKT_HEADER],
            });
        }

        let expected = checksum(&bytes);
        if bytes[PKT_CHECKSUM] != expected {
            return Err(ProtocolError::ChecksumMismatch {
                expected,
                actual: bytes[PKT_CHECKSUM],
            });
        }

        Ok(Self { bytes })
    }

    /// 重新计算校验和并返回待发送字节
    pub fn finalize(&mut self) -> &[u8; EYES_PACKET_SIZE] {
        self.bytes[PKT_CHECKSUM] = checksum(&self.bytes);
        &self.bytes
    }

    pub fn as_bytes(&self) -> &[u8; EYES_PACKET_SIZE] {
        &self.bytes
    }

    pub fn byte(&self, index: usize) -> u8 {
        self.bytes[index]
    }
}
