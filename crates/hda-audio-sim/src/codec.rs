//! Table-driven codec model.
//!
//! Each node answers GET_PARAMETER from a parameter map and keeps the verb-backed state a
//! driver programs (connection select, pin control, converter format, amp gain/mute, ...).
//! Nodes that are not in the table do not answer at all.

use std::collections::BTreeMap;

use hda_audio::verb::*;

const TYPE_AUDIO_OUTPUT: u32 = 0x0;
const TYPE_MIXER: u32 = 0x2;
const TYPE_SELECTOR: u32 = 0x3;
const TYPE_PIN: u32 = 0x4;

const CAP_STEREO: u32 = 1 << 0;
const CAP_IN_AMP: u32 = 1 << 1;
const CAP_OUT_AMP: u32 = 1 << 2;
const CAP_AMP_OVERRIDE: u32 = 1 << 3;
const CAP_FORMAT_OVERRIDE: u32 = 1 << 4;
const CAP_CONN_LIST: u32 = 1 << 8;
const CAP_POWER_CTRL: u32 = 1 << 10;

/// Key for one amplifier channel: (output?, left?, index).
type AmpKey = (bool, bool, u8);

#[derive(Debug, Clone, Default)]
pub struct SimNode {
    params: BTreeMap<u8, u32>,
    connections: Vec<u8>,
    config_default: u32,
    conn_select: u8,
    power_state: u8,
    stream_channel: u8,
    converter_format: u16,
    pin_control: u8,
    eapd: u8,
    amps: BTreeMap<AmpKey, u8>,
    /// Verbs (12-bit id) this node ignores, leaving the command unanswered.
    silent_verbs: Vec<u16>,
}

impl SimNode {
    fn widget(kind: u32, caps: u32) -> Self {
        let mut node = Self::default();
        node.params
            .insert(PARAM_AUDIO_WIDGET_CAPS, (kind << 20) | caps);
        node
    }

    /// An Audio Output converter, stereo, using the group's PCM support.
    pub fn dac() -> Self {
        let mut node = Self::widget(TYPE_AUDIO_OUTPUT, CAP_STEREO);
        node.converter_format = 0x0011;
        node
    }

    pub fn pin(pin_caps: u32, config_default: u32) -> Self {
        let mut node = Self::widget(TYPE_PIN, CAP_STEREO);
        node.params.insert(PARAM_PIN_CAPS, pin_caps);
        node.config_default = config_default;
        node
    }

    pub fn selector() -> Self {
        Self::widget(TYPE_SELECTOR, CAP_STEREO)
    }

    pub fn mixer() -> Self {
        Self::widget(TYPE_MIXER, CAP_STEREO)
    }

    fn set_cap(mut self, bit: u32) -> Self {
        if let Some(caps) = self.params.get_mut(&PARAM_AUDIO_WIDGET_CAPS) {
            *caps |= bit;
        }
        self
    }

    pub fn mono(mut self) -> Self {
        if let Some(caps) = self.params.get_mut(&PARAM_AUDIO_WIDGET_CAPS) {
            *caps &= !CAP_STEREO;
        }
        self
    }

    pub fn connections(mut self, nids: &[u8]) -> Self {
        self.connections = nids.to_vec();
        self.params
            .insert(PARAM_CONN_LIST_LEN, nids.len() as u32);
        self.set_cap(CAP_CONN_LIST)
    }

    /// Give the converter its own PCM support instead of inheriting the group's.
    pub fn pcm(mut self, pcm: u32) -> Self {
        self.params.insert(PARAM_PCM_SIZE_RATES, pcm);
        self.params.insert(PARAM_STREAM_FORMATS, 1);
        self.set_cap(CAP_FORMAT_OVERRIDE)
    }

    pub fn out_amp(mut self, caps: u32) -> Self {
        self.params.insert(PARAM_OUT_AMP_CAPS, caps);
        self.set_cap(CAP_OUT_AMP | CAP_AMP_OVERRIDE)
    }

    pub fn in_amp(mut self, caps: u32) -> Self {
        self.params.insert(PARAM_IN_AMP_CAPS, caps);
        self.set_cap(CAP_IN_AMP | CAP_AMP_OVERRIDE)
    }

    pub fn power_ctrl(mut self) -> Self {
        self.power_state = 0x3;
        self.set_cap(CAP_POWER_CTRL)
    }

    pub fn param(mut self, id: u8, value: u32) -> Self {
        self.params.insert(id, value);
        self
    }

    /// Leave every command using `verb_id` unanswered (for parameters, pass 0xF00).
    pub fn silent(mut self, verb_id: u16) -> Self {
        self.silent_verbs.push(verb_id);
        self
    }

    pub fn pin_control(&self) -> u8 {
        self.pin_control
    }

    pub fn eapd(&self) -> u8 {
        self.eapd
    }

    pub fn stream_channel(&self) -> u8 {
        self.stream_channel
    }

    pub fn converter_format(&self) -> u16 {
        self.converter_format
    }

    pub fn power_state(&self) -> u8 {
        self.power_state
    }

    pub fn conn_select(&self) -> u8 {
        self.conn_select
    }

    /// Gain/mute byte last written to an amp channel (bit 7 mute, 6:0 gain).
    pub fn amp(&self, output: bool, left: bool, index: u8) -> u8 {
        self.amps.get(&(output, left, index)).copied().unwrap_or(0)
    }

    fn conn_list_block(&self, offset: u8) -> u32 {
        self.connections
            .iter()
            .skip(usize::from(offset))
            .take(4)
            .enumerate()
            .fold(0, |acc, (i, nid)| acc | (u32::from(*nid) << (8 * i)))
    }
}

/// A codec with one audio function group at node 1 and widgets from node 2 on.
#[derive(Debug, Clone)]
pub struct SimCodec {
    vendor_id: u32,
    revision_id: u32,
    group: SimNode,
    widgets: BTreeMap<u8, SimNode>,
}

impl SimCodec {
    pub const GROUP_NID: u8 = 1;

    pub fn new(vendor_id: u32, group_pcm: u32) -> Self {
        let mut group = SimNode::default()
            .param(PARAM_FUNCTION_GROUP_TYPE, 0x01)
            .param(PARAM_PCM_SIZE_RATES, group_pcm)
            .param(PARAM_STREAM_FORMATS, 1);
        // Groups come out of link reset in D3.
        group.power_state = 0x3;
        Self {
            vendor_id,
            revision_id: 0x0010_0100,
            group,
            widgets: BTreeMap::new(),
        }
    }

    pub fn widget(mut self, nid: u8, node: SimNode) -> Self {
        self.widgets.insert(nid, node);
        self
    }

    pub fn node(&self, nid: u8) -> Option<&SimNode> {
        match nid {
            0 => None,
            Self::GROUP_NID => Some(&self.group),
            _ => self.widgets.get(&nid),
        }
    }

    pub fn group_power_state(&self) -> u8 {
        self.group.power_state
    }

    fn widget_range(&self) -> (u8, u8) {
        match (self.widgets.keys().next(), self.widgets.keys().next_back()) {
            (Some(&first), Some(&last)) => (first, last - first + 1),
            _ => (2, 0),
        }
    }

    /// Run one verb against node `nid`. `None` means the codec does not answer.
    pub fn execute_verb(&mut self, nid: u8, verb: u32) -> Option<u32> {
        if nid == 0 {
            return self.root_verb(verb);
        }
        let range = self.widget_range();
        let node = if nid == Self::GROUP_NID {
            &mut self.group
        } else {
            self.widgets.get_mut(&nid)?
        };
        let is_group = nid == Self::GROUP_NID;

        // 4-bit verbs carry a 16-bit payload.
        let short_id = ((verb >> 16) & 0xF) as u8;
        if matches!(
            short_id,
            VERB_SET_CONVERTER_FORMAT
                | VERB_SET_AMP_GAIN_MUTE
                | VERB_GET_CONVERTER_FORMAT
                | VERB_GET_AMP_GAIN_MUTE
        ) {
            if node.silent_verbs.contains(&(u16::from(short_id) << 8)) {
                return None;
            }
            return Some(node.payload16_verb(short_id, verb as u16));
        }

        let id = ((verb >> 8) & 0xFFF) as u16;
        let payload = verb as u8;
        if node.silent_verbs.contains(&id) {
            return None;
        }
        let response = match id {
            VERB_GET_PARAMETER => {
                if is_group && payload == PARAM_NODE_COUNT {
                    (u32::from(range.0) << 16) | u32::from(range.1)
                } else {
                    // Unsupported parameters read as zero.
                    node.params.get(&payload).copied().unwrap_or(0)
                }
            }
            VERB_GET_CONN_SELECT => u32::from(node.conn_select),
            VERB_SET_CONN_SELECT => {
                node.conn_select = payload;
                0
            }
            VERB_GET_CONN_LIST => node.conn_list_block(payload),
            VERB_GET_POWER_STATE => {
                let state = u32::from(node.power_state);
                (state << 4) | state
            }
            VERB_SET_POWER_STATE => {
                node.power_state = payload & 0xF;
                0
            }
            VERB_GET_STREAM_CHANNEL => u32::from(node.stream_channel),
            VERB_SET_STREAM_CHANNEL => {
                node.stream_channel = payload;
                0
            }
            VERB_GET_PIN_CONTROL => u32::from(node.pin_control),
            VERB_SET_PIN_CONTROL => {
                node.pin_control = payload;
                0
            }
            VERB_GET_EAPD_BTL => u32::from(node.eapd),
            VERB_SET_EAPD_BTL => {
                node.eapd = payload;
                0
            }
            VERB_GET_CONFIG_DEFAULT => node.config_default,
            _ => 0,
        };
        Some(response)
    }

    fn root_verb(&self, verb: u32) -> Option<u32> {
        let id = ((verb >> 8) & 0xFFF) as u16;
        if id != VERB_GET_PARAMETER {
            return Some(0);
        }
        Some(match verb as u8 {
            PARAM_VENDOR_ID => self.vendor_id,
            PARAM_REVISION_ID => self.revision_id,
            PARAM_NODE_COUNT => (u32::from(Self::GROUP_NID) << 16) | 1,
            _ => 0,
        })
    }
}

impl SimNode {
    fn payload16_verb(&mut self, id: u8, payload: u16) -> u32 {
        match id {
            VERB_SET_CONVERTER_FORMAT => {
                self.converter_format = payload;
                0
            }
            VERB_GET_CONVERTER_FORMAT => u32::from(self.converter_format),
            VERB_SET_AMP_GAIN_MUTE => {
                let index = ((payload >> 8) & 0xF) as u8;
                let value = (payload & 0xFF) as u8;
                let bit = |n: u16| payload & (1 << n) != 0;
                let dirs = [(bit(15), true), (bit(14), false)];
                let channels = [(bit(13), true), (bit(12), false)];
                for (dir_set, output) in dirs {
                    for (ch_set, left) in channels {
                        if dir_set && ch_set {
                            self.amps.insert((output, left, index), value);
                        }
                    }
                }
                0
            }
            VERB_GET_AMP_GAIN_MUTE => {
                let output = payload & (1 << 15) != 0;
                let left = payload & (1 << 13) != 0;
                let index = (payload & 0xF) as u8;
                u32::from(self.amp(output, left, index))
            }
            _ => 0,
        }
    }
}
