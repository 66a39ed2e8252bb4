//! Codec enumeration: root node, function groups and their widget graphs.

use tracing::{debug, warn};

use crate::error::{HdaError, Result};
use crate::format::PcmSupport;
use crate::verb::*;
use crate::widget::*;

const ROOT_NID: u8 = 0;
const FG_TYPE_AUDIO: u8 = 0x01;
const FG_TYPE_MODEM: u8 = 0x02;
const CONN_LIST_LONG_FORM: u32 = 1 << 7;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FunctionGroupKind {
    Audio,
    Modem,
    Other(u8),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FunctionGroup {
    pub nid: u8,
    pub kind: FunctionGroupKind,
    pub caps: Option<u32>,
    pub pcm: Option<PcmSupport>,
    pub stream_formats: Option<u32>,
    pub input_amp_caps: Option<AmpCaps>,
    pub output_amp_caps: Option<AmpCaps>,
    pub widgets: Vec<Widget>,
}

impl FunctionGroup {
    pub fn widget(&self, nid: u8) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.nid == nid)
    }

    /// PCM support for a converter: its own when it overrides the format, else the group's.
    pub fn converter_pcm(&self, widget: &Widget) -> Option<PcmSupport> {
        if widget.caps.contains(WidgetCaps::FORMAT_OVERRIDE) {
            widget.converter().and_then(|conv| conv.pcm)
        } else {
            self.pcm
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Codec {
    pub address: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    pub revision: Option<u32>,
    pub groups: Vec<FunctionGroup>,
}

impl Codec {
    /// Walk the codec at `address`: root node, then every function group and its widgets.
    ///
    /// Only the root vendor id and node count are required. Function groups and widgets whose
    /// mandatory parameter cannot be read are left out; optional fields degrade to `None`.
    pub fn discover<S: CommandSink + ?Sized>(sink: &S, address: u8) -> Result<Codec> {
        let vendor = sink.send_command(address, ROOT_NID, Verb::get_parameter(PARAM_VENDOR_ID))?;
        if vendor == 0 || vendor == u32::MAX {
            return Err(HdaError::DeviceError("codec returned an invalid vendor id"));
        }
        let revision = optional(
            address,
            ROOT_NID,
            "revision id",
            sink.send_command(address, ROOT_NID, Verb::get_parameter(PARAM_REVISION_ID)),
        );
        let nodes = sink.send_command(address, ROOT_NID, Verb::get_parameter(PARAM_NODE_COUNT))?;
        let (start, count) = split_node_count(nodes);

        let mut groups = Vec::new();
        for nid in node_range(start, count) {
            match discover_group(sink, address, nid) {
                Ok(group) => groups.push(group),
                Err(err) => warn!(codec = address, nid, %err, "skipping function group"),
            }
        }

        let codec = Codec {
            address,
            vendor_id: (vendor >> 16) as u16,
            device_id: vendor as u16,
            revision,
            groups,
        };
        debug!(
            codec = address,
            vendor = format_args!("{:04x}:{:04x}", codec.vendor_id, codec.device_id),
            groups = codec.groups.len(),
            "codec discovered"
        );
        Ok(codec)
    }

    pub fn group(&self, nid: u8) -> Option<&FunctionGroup> {
        self.groups.iter().find(|g| g.nid == nid)
    }
}

fn split_node_count(raw: u32) -> (u8, u8) {
    (((raw >> 16) & 0xFF) as u8, (raw & 0xFF) as u8)
}

fn node_range(start: u8, count: u8) -> impl Iterator<Item = u8> {
    let end = (u16::from(start) + u16::from(count)).min(0x80);
    (u16::from(start)..end).map(|nid| nid as u8)
}

fn optional<T>(codec: u8, nid: u8, what: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(codec, nid, what, %err, "optional codec field unavailable");
            None
        }
    }
}

fn discover_group<S: CommandSink + ?Sized>(sink: &S, codec: u8, nid: u8) -> Result<FunctionGroup> {
    let param = |id| sink.send_command(codec, nid, Verb::get_parameter(id));

    let kind = match (param(PARAM_FUNCTION_GROUP_TYPE)? & 0xFF) as u8 {
        FG_TYPE_AUDIO => FunctionGroupKind::Audio,
        FG_TYPE_MODEM => FunctionGroupKind::Modem,
        other => FunctionGroupKind::Other(other),
    };

    let mut group = FunctionGroup {
        nid,
        kind,
        caps: None,
        pcm: None,
        stream_formats: None,
        input_amp_caps: None,
        output_amp_caps: None,
        widgets: Vec::new(),
    };
    if kind != FunctionGroupKind::Audio {
        debug!(codec, nid, ?kind, "non-audio function group");
        return Ok(group);
    }

    optional(
        codec,
        nid,
        "function group power-up",
        sink.send_command(codec, nid, Verb::set_power_state(POWER_STATE_D0)),
    );

    let field = |what: &'static str, id: u8| optional(codec, nid, what, param(id));
    group.caps = field("audio group caps", PARAM_AUDIO_FG_CAPS);
    group.pcm = field("group PCM support", PARAM_PCM_SIZE_RATES).map(PcmSupport);
    group.stream_formats = field("group stream formats", PARAM_STREAM_FORMATS);
    group.input_amp_caps = field("group input amp caps", PARAM_IN_AMP_CAPS).map(AmpCaps::from_raw);
    group.output_amp_caps =
        field("group output amp caps", PARAM_OUT_AMP_CAPS).map(AmpCaps::from_raw);

    let Some(nodes) = optional(codec, nid, "group node count", param(PARAM_NODE_COUNT)) else {
        return Ok(group);
    };
    let (start, count) = split_node_count(nodes);
    for wnid in node_range(start, count) {
        match discover_widget(sink, codec, &group, wnid) {
            Ok(widget) => group.widgets.push(widget),
            Err(err) => warn!(codec, nid = wnid, %err, "excluding widget"),
        }
    }
    debug!(codec, nid, widgets = group.widgets.len(), "audio function group discovered");
    Ok(group)
}

fn discover_widget<S: CommandSink + ?Sized>(
    sink: &S,
    codec: u8,
    group: &FunctionGroup,
    nid: u8,
) -> Result<Widget> {
    let param = |id| sink.send_command(codec, nid, Verb::get_parameter(id));
    let get = |verb| sink.send_command(codec, nid, verb);
    let field = |what: &'static str, id: u8| optional(codec, nid, what, param(id));
    let state = |what: &'static str, verb_id: u16| {
        optional(codec, nid, what, get(Verb::new(verb_id, 0)))
    };

    // The only mandatory read for a widget.
    let raw_caps = param(PARAM_AUDIO_WIDGET_CAPS)?;
    let kind = WidgetKind::from_caps(raw_caps);
    let caps = WidgetCaps::from_bits_truncate(raw_caps);

    let connections = if caps.contains(WidgetCaps::CONN_LIST) {
        optional(codec, nid, "connection list", read_connections(sink, codec, nid))
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let power_state = if caps.contains(WidgetCaps::POWER_CTRL) {
        state("power state", VERB_GET_POWER_STATE)
    } else {
        None
    };

    let payload = match kind {
        WidgetKind::AudioOutput | WidgetKind::AudioInput => {
            let mut conv = ConverterInfo::default();
            if caps.contains(WidgetCaps::FORMAT_OVERRIDE) {
                conv.pcm = field("PCM support", PARAM_PCM_SIZE_RATES).map(PcmSupport);
                conv.stream_formats = field("stream formats", PARAM_STREAM_FORMATS);
            } else {
                conv.pcm = group.pcm;
                conv.stream_formats = group.stream_formats;
            }
            conv.default_format =
                optional(codec, nid, "converter format", get(Verb::get_converter_format()))
                    .map(|raw| raw as u16);
            conv.default_stream_channel =
                state("stream/channel", VERB_GET_STREAM_CHANNEL).map(|raw| raw as u8);
            WidgetPayload::Converter(conv)
        }
        WidgetKind::PinComplex => {
            let pin_caps = field("pin caps", PARAM_PIN_CAPS).map(PinCaps::from_bits_truncate);
            let config =
                state("configuration default", VERB_GET_CONFIG_DEFAULT).map(PinConfig::from_raw);
            let control = state("pin control", VERB_GET_PIN_CONTROL)
                .map(|raw| PinControl::from_bits_retain(raw as u8));
            let eapd = if pin_caps.is_some_and(|c| c.contains(PinCaps::EAPD)) {
                state("EAPD/BTL", VERB_GET_EAPD_BTL).map(|raw| raw as u8)
            } else {
                None
            };
            WidgetPayload::Pin(PinInfo {
                caps: pin_caps,
                config,
                control,
                eapd,
            })
        }
        WidgetKind::VolumeKnob => WidgetPayload::VolumeKnob(VolumeKnobInfo {
            caps: field("volume knob caps", PARAM_VOLUME_KNOB_CAPS),
            value: state("volume knob", VERB_GET_VOLUME_KNOB).map(|raw| (raw & 0x7F) as u8),
        }),
        _ => WidgetPayload::None,
    };

    let stereo = caps.contains(WidgetCaps::STEREO);
    let input_amp = if caps.contains(WidgetCaps::IN_AMP) {
        let amp_caps = if caps.contains(WidgetCaps::AMP_OVERRIDE) {
            field("input amp caps", PARAM_IN_AMP_CAPS).map(AmpCaps::from_raw)
        } else {
            group.input_amp_caps
        };
        let indices = connections.len().clamp(1, 16) as u8;
        Some(read_amp(sink, codec, nid, AmpDir::Input, amp_caps, indices, stereo))
    } else {
        None
    };
    let output_amp = if caps.contains(WidgetCaps::OUT_AMP) {
        let amp_caps = if caps.contains(WidgetCaps::AMP_OVERRIDE) {
            field("output amp caps", PARAM_OUT_AMP_CAPS).map(AmpCaps::from_raw)
        } else {
            group.output_amp_caps
        };
        Some(read_amp(sink, codec, nid, AmpDir::Output, amp_caps, 1, stereo))
    } else {
        None
    };

    debug!(codec, nid, ?kind, caps = raw_caps, connections = ?connections, "widget");
    Ok(Widget {
        nid,
        kind,
        caps,
        raw_caps,
        connections,
        power_state,
        input_amp,
        output_amp,
        payload,
    })
}

fn read_amp<S: CommandSink + ?Sized>(
    sink: &S,
    codec: u8,
    nid: u8,
    dir: AmpDir,
    caps: Option<AmpCaps>,
    indices: u8,
    stereo: bool,
) -> Amp {
    let read = |channel, index| {
        optional(
            codec,
            nid,
            "amp gain/mute",
            sink.send_command(codec, nid, Verb::get_amp_gain_mute(dir, channel, index)),
        )
        .map(AmpGain::from_response)
    };
    let defaults = (0..indices)
        .map(|index| {
            let left = read(AmpChannel::Left, index);
            let right = if stereo {
                read(AmpChannel::Right, index)
            } else {
                None
            };
            [left, right]
        })
        .collect();
    Amp {
        caps: caps.unwrap_or_default(),
        defaults,
    }
}

/// Read and expand a connection list, handling both entry widths and ranges.
fn read_connections<S: CommandSink + ?Sized>(sink: &S, codec: u8, nid: u8) -> Result<Vec<u8>> {
    let len_raw = sink.send_command(codec, nid, Verb::get_parameter(PARAM_CONN_LIST_LEN))?;
    let long_form = len_raw & CONN_LIST_LONG_FORM != 0;
    let len = (len_raw & 0x7F) as usize;
    let (per_response, width, range_bit, mask) = if long_form {
        (2usize, 16u32, 1u32 << 15, 0x7FFFu32)
    } else {
        (4usize, 8u32, 1u32 << 7, 0x7Fu32)
    };

    let mut raw_entries = Vec::with_capacity(len);
    let mut offset = 0usize;
    while offset < len {
        let block = sink.send_command(codec, nid, Verb::get_connection_list(offset as u8))?;
        for i in 0..per_response.min(len - offset) {
            raw_entries.push((block >> (width * i as u32)) & ((1 << width) - 1));
        }
        offset += per_response;
    }

    let mut connections: Vec<u8> = Vec::with_capacity(len);
    for entry in raw_entries {
        let value = (entry & mask) as u8;
        if entry & range_bit != 0 {
            let Some(&prev) = connections.last() else {
                return Err(HdaError::DeviceError("connection list starts with a range"));
            };
            if value <= prev {
                return Err(HdaError::DeviceError("connection list range runs backwards"));
            }
            connections.extend(prev + 1..=value);
        } else {
            connections.push(value);
        }
    }
    Ok(connections)
}

/// A playable output jack, numbered across every discovered codec.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OutputPort {
    pub index: usize,
    pub codec: u8,
    pub group: u8,
    pub pin: u8,
    pub device: DeviceKind,
    pub location: Location,
    pub surface: Surface,
}

/// Output-capable pins whose configuration default is not "no physical connection".
pub fn output_ports(codecs: &[Codec]) -> Vec<OutputPort> {
    let mut ports = Vec::new();
    for codec in codecs {
        for group in codec.groups.iter().filter(|g| g.kind == FunctionGroupKind::Audio) {
            for widget in &group.widgets {
                let Some(pin) = widget.pin() else { continue };
                let Some(config) = pin.config else { continue };
                if !pin.is_output_capable() || !pin.is_connected() {
                    continue;
                }
                ports.push(OutputPort {
                    index: ports.len(),
                    codec: codec.address,
                    group: group.nid,
                    pin: widget.nid,
                    device: config.device,
                    location: config.location,
                    surface: config.surface,
                });
            }
        }
    }
    ports
}
