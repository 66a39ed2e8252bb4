#![allow(dead_code)]

use hda_audio::{Controller, HdaConfig};
use hda_audio_sim::{SimCodec, SimHda, SimNode, SimPlatform};

pub const VENDOR_REALTEK_ALC662: u32 = 0x10EC_0662;

/// 44.1 kHz and 48 kHz, 16-bit.
pub const PCM_44K1_48K_16: u32 = (1 << 5) | (1 << 6) | (1 << 17);

pub const PIN_CAP_HP_DRIVE: u32 = 1 << 3;
pub const PIN_CAP_OUTPUT: u32 = 1 << 4;
pub const PIN_CAP_EAPD: u32 = 1 << 16;

/// Fixed internal speaker, association 1.
pub const CONFIG_INTERNAL_SPEAKER: u32 = 0x9017_0110;
/// Front-panel headphone jack, association 2.
pub const CONFIG_FRONT_HEADPHONE: u32 = 0x0221_4020;

/// Output amp: 0x27 steps of 0.75 dB, offset 0x27, mute capable.
pub const DAC_OUT_AMP: u32 = 0x8002_2727;

pub const SPEAKER_PIN: u8 = 0x14;
pub const HEADPHONE_PIN: u8 = 0x15;
pub const SPEAKER_DAC: u8 = 0x02;
pub const HEADPHONE_DAC: u8 = 0x03;

/// Descriptor 0 is the input stream, descriptor 1 the output stream.
pub const OUTPUT_STREAM: usize = 1;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Small buffers and short timeouts so simulated runs stay quick.
pub fn test_config() -> HdaConfig {
    HdaConfig {
        command_retries: 50,
        command_retry_interval_us: 10,
        register_settle_retries: 50,
        register_settle_interval_us: 10,
        bdl_entries: 4,
        block_size: 1024,
        poll_interval_us: 200,
        stall_watchdog_polls: 50,
        ..HdaConfig::default()
    }
}

/// Speaker pin 0x14 wired straight to DAC 0x02.
pub fn speaker_codec() -> SimCodec {
    SimCodec::new(VENDOR_REALTEK_ALC662, PCM_44K1_48K_16)
        .widget(SPEAKER_DAC, SimNode::dac().out_amp(DAC_OUT_AMP))
        .widget(
            SPEAKER_PIN,
            SimNode::pin(PIN_CAP_OUTPUT | PIN_CAP_EAPD, CONFIG_INTERNAL_SPEAKER)
                .connections(&[SPEAKER_DAC]),
        )
}

/// Speaker pin 0x14 on DAC 0x02 and headphone pin 0x15 on DAC 0x03.
pub fn two_port_codec() -> SimCodec {
    speaker_codec()
        .widget(HEADPHONE_DAC, SimNode::dac().out_amp(DAC_OUT_AMP))
        .widget(
            HEADPHONE_PIN,
            SimNode::pin(PIN_CAP_OUTPUT | PIN_CAP_HP_DRIVE, CONFIG_FRONT_HEADPHONE)
                .connections(&[HEADPHONE_DAC]),
        )
}

/// One output and one input stream descriptor.
pub fn sim_with(codec: SimCodec) -> SimHda {
    SimHda::new(1, 1, 0).codec(0, codec)
}

pub fn bind(hda: SimHda) -> (Controller<SimPlatform>, SimPlatform) {
    init_tracing();
    let platform = SimPlatform::new(hda);
    let controller = Controller::bind(platform.clone(), test_config()).unwrap();
    (controller, platform)
}

/// Bytes `len` long, cycling through a prime-length pattern so misplaced blocks show up.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 + 1).collect()
}
