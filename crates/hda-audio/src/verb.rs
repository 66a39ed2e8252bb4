//! Codec verbs, parameters and the command/response word formats.

use crate::error::Result;

// 12-bit verb identifiers (8-bit payload).
pub const VERB_GET_PARAMETER: u16 = 0xF00;
pub const VERB_GET_CONN_SELECT: u16 = 0xF01;
pub const VERB_SET_CONN_SELECT: u16 = 0x701;
pub const VERB_GET_CONN_LIST: u16 = 0xF02;
pub const VERB_GET_POWER_STATE: u16 = 0xF05;
pub const VERB_SET_POWER_STATE: u16 = 0x705;
pub const VERB_GET_STREAM_CHANNEL: u16 = 0xF06;
pub const VERB_SET_STREAM_CHANNEL: u16 = 0x706;
pub const VERB_GET_PIN_CONTROL: u16 = 0xF07;
pub const VERB_SET_PIN_CONTROL: u16 = 0x707;
pub const VERB_GET_EAPD_BTL: u16 = 0xF0C;
pub const VERB_SET_EAPD_BTL: u16 = 0x70C;
pub const VERB_GET_VOLUME_KNOB: u16 = 0xF0F;
pub const VERB_GET_CONFIG_DEFAULT: u16 = 0xF1C;

// 4-bit verb identifiers (16-bit payload).
pub const VERB_SET_CONVERTER_FORMAT: u8 = 0x2;
pub const VERB_SET_AMP_GAIN_MUTE: u8 = 0x3;
pub const VERB_GET_CONVERTER_FORMAT: u8 = 0xA;
pub const VERB_GET_AMP_GAIN_MUTE: u8 = 0xB;

// GET_PARAMETER parameter ids.
pub const PARAM_VENDOR_ID: u8 = 0x00;
pub const PARAM_REVISION_ID: u8 = 0x02;
pub const PARAM_NODE_COUNT: u8 = 0x04;
pub const PARAM_FUNCTION_GROUP_TYPE: u8 = 0x05;
pub const PARAM_AUDIO_FG_CAPS: u8 = 0x08;
pub const PARAM_AUDIO_WIDGET_CAPS: u8 = 0x09;
pub const PARAM_PCM_SIZE_RATES: u8 = 0x0A;
pub const PARAM_STREAM_FORMATS: u8 = 0x0B;
pub const PARAM_PIN_CAPS: u8 = 0x0C;
pub const PARAM_IN_AMP_CAPS: u8 = 0x0D;
pub const PARAM_CONN_LIST_LEN: u8 = 0x0E;
pub const PARAM_POWER_STATES: u8 = 0x0F;
pub const PARAM_OUT_AMP_CAPS: u8 = 0x12;
pub const PARAM_VOLUME_KNOB_CAPS: u8 = 0x13;

pub const POWER_STATE_D0: u8 = 0x0;

pub const EAPD_BTL_EAPD: u8 = 1 << 1;

/// Response bit 4 of the extended word flags an unsolicited response.
const RESPONSE_EX_UNSOL: u32 = 1 << 4;

/// One 20-bit verb + payload, ready to be addressed to a codec node.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Verb(u32);

impl Verb {
    /// 12-bit verb identifier with an 8-bit payload.
    pub const fn new(id: u16, payload: u8) -> Self {
        Self(((id as u32 & 0xFFF) << 8) | payload as u32)
    }

    /// 4-bit verb identifier with a 16-bit payload.
    pub const fn with_payload16(id: u8, payload: u16) -> Self {
        Self(((id as u32 & 0xF) << 16) | payload as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn get_parameter(param: u8) -> Self {
        Self::new(VERB_GET_PARAMETER, param)
    }

    /// Fetch the connection-list block that starts at entry `offset`.
    pub const fn get_connection_list(offset: u8) -> Self {
        Self::new(VERB_GET_CONN_LIST, offset)
    }

    pub const fn set_connection_select(index: u8) -> Self {
        Self::new(VERB_SET_CONN_SELECT, index)
    }

    pub const fn set_power_state(state: u8) -> Self {
        Self::new(VERB_SET_POWER_STATE, state)
    }

    pub const fn set_stream_channel(tag: u8, channel: u8) -> Self {
        Self::new(VERB_SET_STREAM_CHANNEL, (tag << 4) | (channel & 0xF))
    }

    pub const fn set_pin_control(ctl: u8) -> Self {
        Self::new(VERB_SET_PIN_CONTROL, ctl)
    }

    pub const fn set_eapd_btl(value: u8) -> Self {
        Self::new(VERB_SET_EAPD_BTL, value)
    }

    pub const fn set_converter_format(fmt: u16) -> Self {
        Self::with_payload16(VERB_SET_CONVERTER_FORMAT, fmt)
    }

    pub const fn get_converter_format() -> Self {
        Self::with_payload16(VERB_GET_CONVERTER_FORMAT, 0)
    }

    pub const fn get_amp_gain_mute(dir: AmpDir, channel: AmpChannel, index: u8) -> Self {
        let mut payload = (index & 0xF) as u16;
        if matches!(dir, AmpDir::Output) {
            payload |= 1 << 15;
        }
        if matches!(channel, AmpChannel::Left) {
            payload |= 1 << 13;
        }
        Self::with_payload16(VERB_GET_AMP_GAIN_MUTE, payload)
    }

    pub const fn set_amp_gain_mute(
        dir: AmpDir,
        channel: AmpChannel,
        index: u8,
        mute: bool,
        gain: u8,
    ) -> Self {
        let mut payload = ((index & 0xF) as u16) << 8 | (gain & 0x7F) as u16;
        payload |= match dir {
            AmpDir::Output => 1 << 15,
            AmpDir::Input => 1 << 14,
        };
        payload |= match channel {
            AmpChannel::Left => 1 << 13,
            AmpChannel::Right => 1 << 12,
        };
        if mute {
            payload |= 1 << 7;
        }
        Self::with_payload16(VERB_SET_AMP_GAIN_MUTE, payload)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmpDir {
    Input,
    Output,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AmpChannel {
    Left,
    Right,
}

/// Pack a CORB entry: codec address 31:28, node id 27:20, verb 19:0.
pub fn encode_command(codec: u8, nid: u8, verb: Verb) -> u32 {
    (u32::from(codec & 0xF) << 28) | (u32::from(nid & 0x7F) << 20) | (verb.raw() & 0xF_FFFF)
}

/// One RIRB entry: the 32-bit response plus the extended word carrying its origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RirbEntry {
    pub response: u32,
    pub ext: u32,
}

impl RirbEntry {
    pub fn decode(raw: u64) -> Self {
        Self {
            response: raw as u32,
            ext: (raw >> 32) as u32,
        }
    }

    pub fn codec(&self) -> u8 {
        (self.ext & 0xF) as u8
    }

    pub fn is_unsolicited(&self) -> bool {
        self.ext & RESPONSE_EX_UNSOL != 0
    }
}

/// Anything that can carry verbs to a codec node and hand back the responses in order.
///
/// Implemented by the controller (through its locked command transport); discovery and path
/// programming only ever talk to codecs through this seam.
pub trait CommandSink {
    fn send_commands(&self, codec: u8, nid: u8, verbs: &[Verb]) -> Result<Vec<u32>>;

    fn send_command(&self, codec: u8, nid: u8, verb: Verb) -> Result<u32> {
        let responses = self.send_commands(codec, nid, &[verb])?;
        Ok(responses.first().copied().unwrap_or(0))
    }
}
