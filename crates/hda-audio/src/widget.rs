//! Widget capability words and the typed per-widget payloads decoded at discovery.

use bitflags::bitflags;

use crate::format::PcmSupport;

bitflags! {
    /// Audio Widget Capabilities (parameter 0x09), flag bits only.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct WidgetCaps: u32 {
        const STEREO = 1 << 0;
        const IN_AMP = 1 << 1;
        const OUT_AMP = 1 << 2;
        const AMP_OVERRIDE = 1 << 3;
        const FORMAT_OVERRIDE = 1 << 4;
        const STRIPE = 1 << 5;
        const PROC_WIDGET = 1 << 6;
        const UNSOL_CAPABLE = 1 << 7;
        const CONN_LIST = 1 << 8;
        const DIGITAL = 1 << 9;
        const POWER_CTRL = 1 << 10;
        const LR_SWAP = 1 << 11;
        const CP_CAPS = 1 << 12;
    }
}

bitflags! {
    /// Pin Capabilities (parameter 0x0C).
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PinCaps: u32 {
        const IMPEDANCE_SENSE = 1 << 0;
        const TRIGGER_REQUIRED = 1 << 1;
        const PRESENCE_DETECT = 1 << 2;
        const HEADPHONE_DRIVE = 1 << 3;
        const OUTPUT = 1 << 4;
        const INPUT = 1 << 5;
        const BALANCED = 1 << 6;
        const HDMI = 1 << 7;
        const EAPD = 1 << 16;
        const DISPLAY_PORT = 1 << 24;
        const HBR = 1 << 27;
    }
}

bitflags! {
    /// Pin Widget Control (verbs 0xF07/0x707). VREF occupies bits 2:0 and is kept as-is.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PinControl: u8 {
        const VREF_MASK = 0x7;
        const IN_ENABLE = 1 << 5;
        const OUT_ENABLE = 1 << 6;
        const HP_ENABLE = 1 << 7;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WidgetKind {
    AudioOutput,
    AudioInput,
    Mixer,
    Selector,
    PinComplex,
    Power,
    VolumeKnob,
    BeepGenerator,
    VendorDefined,
    Reserved(u8),
}

impl WidgetKind {
    pub fn from_caps(raw: u32) -> Self {
        match ((raw >> 20) & 0xF) as u8 {
            0x0 => WidgetKind::AudioOutput,
            0x1 => WidgetKind::AudioInput,
            0x2 => WidgetKind::Mixer,
            0x3 => WidgetKind::Selector,
            0x4 => WidgetKind::PinComplex,
            0x5 => WidgetKind::Power,
            0x6 => WidgetKind::VolumeKnob,
            0x7 => WidgetKind::BeepGenerator,
            0xF => WidgetKind::VendorDefined,
            other => WidgetKind::Reserved(other),
        }
    }

    pub fn is_converter(self) -> bool {
        matches!(self, WidgetKind::AudioOutput | WidgetKind::AudioInput)
    }
}

/// Channel count a widget handles: the 3-bit extension in 15:13 plus the stereo bit.
pub fn channel_count(raw_caps: u32) -> u8 {
    let ext = ((raw_caps >> 13) & 0x7) as u8;
    (ext << 1) + (raw_caps & 1) as u8 + 1
}

/// Amplifier Capabilities (parameters 0x0D / 0x12).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AmpCaps {
    /// Step that corresponds to 0 dB.
    pub offset: u8,
    /// Number of gain steps; the highest programmable gain equals this value.
    pub num_steps: u8,
    /// Step size in 0.25 dB units, minus one.
    pub step_size: u8,
    pub mute_capable: bool,
}

impl AmpCaps {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            offset: (raw & 0x7F) as u8,
            num_steps: ((raw >> 8) & 0x7F) as u8,
            step_size: ((raw >> 16) & 0x7F) as u8,
            mute_capable: raw & (1 << 31) != 0,
        }
    }

    /// Gain for a 0..=100 volume, scaled linearly from the lowest step up to the 0 dB step.
    /// Amps whose 0 dB point is step 0 (gain-only) scale across every step instead.
    pub fn gain_for_volume(&self, volume: u8) -> u8 {
        let volume = u32::from(volume.min(100));
        let top = if self.offset == 0 {
            self.num_steps
        } else {
            self.offset.min(self.num_steps)
        };
        (u32::from(top) * volume / 100) as u8
    }
}

/// Gain/mute as read back from one amplifier channel.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AmpGain {
    pub gain: u8,
    pub mute: bool,
}

impl AmpGain {
    pub fn from_response(raw: u32) -> Self {
        Self {
            gain: (raw & 0x7F) as u8,
            mute: raw & (1 << 7) != 0,
        }
    }
}

/// An input or output amplifier with its power-on defaults.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Amp {
    pub caps: AmpCaps,
    /// Default gain per amp index (connection index for input amps, just 0 for output amps),
    /// as `[left, right]`. `None` where the readback failed; `right` is absent on mono widgets.
    pub defaults: Vec<[Option<AmpGain>; 2]>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Connectivity {
    Jack,
    None,
    Fixed,
    Both,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeviceKind {
    LineOut,
    Speaker,
    Headphone,
    Cd,
    SpdifOut,
    DigitalOtherOut,
    ModemLineSide,
    ModemHandsetSide,
    LineIn,
    Aux,
    Mic,
    Telephony,
    SpdifIn,
    DigitalOtherIn,
    Reserved,
    Other,
}

impl DeviceKind {
    fn from_bits(bits: u8) -> Self {
        match bits & 0xF {
            0x0 => DeviceKind::LineOut,
            0x1 => DeviceKind::Speaker,
            0x2 => DeviceKind::Headphone,
            0x3 => DeviceKind::Cd,
            0x4 => DeviceKind::SpdifOut,
            0x5 => DeviceKind::DigitalOtherOut,
            0x6 => DeviceKind::ModemLineSide,
            0x7 => DeviceKind::ModemHandsetSide,
            0x8 => DeviceKind::LineIn,
            0x9 => DeviceKind::Aux,
            0xA => DeviceKind::Mic,
            0xB => DeviceKind::Telephony,
            0xC => DeviceKind::SpdifIn,
            0xD => DeviceKind::DigitalOtherIn,
            0xE => DeviceKind::Reserved,
            _ => DeviceKind::Other,
        }
    }
}

/// Gross location, bits 29:28 of the configuration default.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Surface {
    External,
    Internal,
    Separate,
    Other,
}

/// Geometric location, bits 27:24 of the configuration default.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Location {
    NotApplicable,
    Rear,
    Front,
    Left,
    Right,
    Top,
    Bottom,
    Special(u8),
}

/// Decoded Configuration Default (verb 0xF1C).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PinConfig {
    pub raw: u32,
    pub connectivity: Connectivity,
    pub surface: Surface,
    pub location: Location,
    pub device: DeviceKind,
    pub connection_type: u8,
    pub color: u8,
    pub misc: u8,
    pub association: u8,
    pub sequence: u8,
}

impl PinConfig {
    pub fn from_raw(raw: u32) -> Self {
        let connectivity = match (raw >> 30) & 0x3 {
            0 => Connectivity::Jack,
            1 => Connectivity::None,
            2 => Connectivity::Fixed,
            _ => Connectivity::Both,
        };
        let surface = match (raw >> 28) & 0x3 {
            0 => Surface::External,
            1 => Surface::Internal,
            2 => Surface::Separate,
            _ => Surface::Other,
        };
        let location = match ((raw >> 24) & 0xF) as u8 {
            0x0 => Location::NotApplicable,
            0x1 => Location::Rear,
            0x2 => Location::Front,
            0x3 => Location::Left,
            0x4 => Location::Right,
            0x5 => Location::Top,
            0x6 => Location::Bottom,
            other => Location::Special(other),
        };
        Self {
            raw,
            connectivity,
            surface,
            location,
            device: DeviceKind::from_bits(((raw >> 20) & 0xF) as u8),
            connection_type: ((raw >> 16) & 0xF) as u8,
            color: ((raw >> 12) & 0xF) as u8,
            misc: ((raw >> 8) & 0xF) as u8,
            association: ((raw >> 4) & 0xF) as u8,
            sequence: (raw & 0xF) as u8,
        }
    }
}

/// Converter (Audio Output / Audio Input) fields.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ConverterInfo {
    pub pcm: Option<PcmSupport>,
    pub stream_formats: Option<u32>,
    /// Converter format word found at discovery.
    pub default_format: Option<u16>,
    /// Stream/channel byte found at discovery (tag 7:4, channel 3:0).
    pub default_stream_channel: Option<u8>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PinInfo {
    pub caps: Option<PinCaps>,
    pub config: Option<PinConfig>,
    pub control: Option<PinControl>,
    /// EAPD/BTL byte, read only on EAPD-capable pins.
    pub eapd: Option<u8>,
}

impl PinInfo {
    pub fn is_output_capable(&self) -> bool {
        self.caps.is_some_and(|caps| caps.contains(PinCaps::OUTPUT))
    }

    pub fn is_connected(&self) -> bool {
        self.config
            .is_some_and(|config| config.connectivity != Connectivity::None)
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct VolumeKnobInfo {
    pub caps: Option<u32>,
    pub value: Option<u8>,
}

/// The fields that only make sense for one kind of widget.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WidgetPayload {
    Converter(ConverterInfo),
    Pin(PinInfo),
    VolumeKnob(VolumeKnobInfo),
    None,
}

/// One node in a function group's widget graph.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Widget {
    pub nid: u8,
    pub kind: WidgetKind,
    pub caps: WidgetCaps,
    pub raw_caps: u32,
    pub connections: Vec<u8>,
    pub power_state: Option<u32>,
    pub input_amp: Option<Amp>,
    pub output_amp: Option<Amp>,
    pub payload: WidgetPayload,
}

impl Widget {
    pub fn channels(&self) -> u8 {
        channel_count(self.raw_caps)
    }

    pub fn is_stereo(&self) -> bool {
        self.caps.contains(WidgetCaps::STEREO)
    }

    pub fn pin(&self) -> Option<&PinInfo> {
        match &self.payload {
            WidgetPayload::Pin(pin) => Some(pin),
            _ => None,
        }
    }

    pub fn converter(&self) -> Option<&ConverterInfo> {
        match &self.payload {
            WidgetPayload::Converter(conv) => Some(conv),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_type_and_channels_come_from_caps() {
        // Audio output, stereo, out amp, format override, power control.
        let raw = 0x0000_0415;
        assert_eq!(WidgetKind::from_caps(raw), WidgetKind::AudioOutput);
        let caps = WidgetCaps::from_bits_truncate(raw);
        assert!(caps.contains(WidgetCaps::STEREO | WidgetCaps::OUT_AMP | WidgetCaps::POWER_CTRL));
        assert_eq!(channel_count(raw), 2);

        // Pin complex, mono.
        assert_eq!(WidgetKind::from_caps(0x0040_0000), WidgetKind::PinComplex);
        assert_eq!(channel_count(0x0040_0000), 1);
        // Channel count extension 1 with stereo: 4 channels.
        assert_eq!(channel_count((1 << 13) | 1), 4);
        assert_eq!(WidgetKind::from_caps(0x00F0_0000), WidgetKind::VendorDefined);
    }

    #[test]
    fn config_default_decodes_internal_speaker() {
        // Fixed, internal, no geometric location, speaker, analog, misc 0, assoc 1, seq 0.
        let config = PinConfig::from_raw(0x9017_0110);
        assert_eq!(config.connectivity, Connectivity::Fixed);
        assert_eq!(config.surface, Surface::Internal);
        assert_eq!(config.location, Location::NotApplicable);
        assert_eq!(config.device, DeviceKind::Speaker);
        assert_eq!(config.connection_type, 0x7);
        assert_eq!(config.association, 1);

        // Jack, external, front, headphone.
        let hp = PinConfig::from_raw(0x0221_4020);
        assert_eq!(hp.connectivity, Connectivity::Jack);
        assert_eq!(hp.location, Location::Front);
        assert_eq!(hp.device, DeviceKind::Headphone);

        assert_eq!(
            PinConfig::from_raw(0x4000_0000).connectivity,
            Connectivity::None
        );
    }

    #[test]
    fn amp_caps_scale_volume_into_step_range() {
        // Mute capable, step size 5, 0x57 steps, offset 0x57.
        let caps = AmpCaps::from_raw(0x8005_5757);
        assert!(caps.mute_capable);
        assert_eq!(caps.num_steps, 0x57);
        assert_eq!(caps.offset, 0x57);
        assert_eq!(caps.gain_for_volume(100), 0x57);
        assert_eq!(caps.gain_for_volume(0), 0);
        assert_eq!(caps.gain_for_volume(50), 43);
        assert_eq!(caps.gain_for_volume(200), 0x57);
    }

    #[test]
    fn full_volume_stops_at_zero_db() {
        // 0x7F steps, 0 dB at step 0x40.
        let caps = AmpCaps::from_raw(0x8005_7F40);
        assert_eq!(caps.gain_for_volume(100), 0x40);
        assert_eq!(caps.gain_for_volume(50), 0x20);

        // Gain-only amp: 0 dB is the bottom step, so the whole range is used.
        let boost = AmpCaps::from_raw(0x0027_0300);
        assert_eq!(boost.gain_for_volume(100), 3);
        assert_eq!(boost.gain_for_volume(40), 1);
    }

    #[test]
    fn pin_predicates_need_caps_and_config() {
        let pin = PinInfo {
            caps: Some(PinCaps::OUTPUT),
            config: None,
            control: None,
            eapd: None,
        };
        assert!(pin.is_output_capable());
        assert!(!pin.is_connected());
    }
}
