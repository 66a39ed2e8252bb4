mod common;

use common::*;
use hda_audio::regs::{stream_base, SD_CTL, SD_LPIB};
use hda_audio::{HdaError, PlaybackSession, PlaybackState, Stall};
use hda_audio_sim::{SimCodec, SimNode};

fn configured_speaker() -> (
    hda_audio::Controller<hda_audio_sim::SimPlatform>,
    hda_audio_sim::SimPlatform,
    PlaybackSession,
) {
    let (mut controller, platform) = bind(sim_with(speaker_codec()));
    let mut session = PlaybackSession::new();
    controller
        .setup_playback(&mut session, 0, 80, 44_100, 16, 2)
        .unwrap();
    (controller, platform, session)
}

#[test]
fn speaker_plays_a_short_buffer_of_silence() {
    let (mut controller, platform, mut session) = configured_speaker();
    assert_eq!(session.state(), PlaybackState::Configured);
    assert_eq!(session.output(), Some(0));

    let tag = controller.streams()[OUTPUT_STREAM].tag();
    assert_eq!(tag, 1);
    {
        let hda = platform.hda();
        let codec = hda.codec_model(0).unwrap();
        let pin = codec.node(SPEAKER_PIN).unwrap();
        assert_eq!(pin.pin_control(), 0x40);
        assert_eq!(pin.eapd() & 0x02, 0x02);

        let dac = codec.node(SPEAKER_DAC).unwrap();
        assert_eq!(dac.converter_format(), 0x4011);
        assert_eq!(dac.stream_channel(), tag << 4);
        // 0x27 steps at volume 80.
        assert_eq!(dac.amp(true, true, 0), 31);
        assert_eq!(dac.amp(true, false, 0), 31);

        assert_eq!(hda.stream(OUTPUT_STREAM).unwrap().fmt(), 0x4011);
    }

    controller
        .start_playback(&mut session, &[0u8; 512], 0)
        .unwrap();
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);
    assert!(!platform.hda().stream(OUTPUT_STREAM).unwrap().is_running());

    let played = platform.played(OUTPUT_STREAM);
    assert!(played.len() >= 512);
    assert!(played.iter().all(|b| *b == 0));
}

#[test]
fn unsupported_rate_leaves_every_path_untouched() {
    let (mut controller, platform) = bind(sim_with(speaker_codec()));
    platform.hda_mut().clear_verb_log();
    let mut session = PlaybackSession::new();

    let err = controller
        .setup_playback(&mut session, 0, 80, 192_000, 16, 2)
        .unwrap_err();
    assert!(matches!(err, HdaError::Unsupported(_)));
    assert!(platform.hda().verb_log().is_empty());
    assert_eq!(platform.pin_control(0, SPEAKER_PIN), Some(0));
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);
}

#[test]
fn unsupported_depth_and_channel_count_are_rejected() {
    let (mut controller, platform) = bind(sim_with(speaker_codec()));
    let mut session = PlaybackSession::new();

    assert!(matches!(
        controller.setup_playback(&mut session, 0, 80, 48_000, 24, 2),
        Err(HdaError::Unsupported(_))
    ));
    assert!(matches!(
        controller.setup_playback(&mut session, 0, 80, 48_000, 16, 4),
        Err(HdaError::Unsupported(_))
    ));
    assert_eq!(platform.pin_control(0, SPEAKER_PIN), Some(0));
}

#[test]
fn bad_arguments_are_invalid_parameters() {
    let (mut controller, _platform) = bind(sim_with(speaker_codec()));
    let mut session = PlaybackSession::new();

    assert!(matches!(
        controller.setup_playback(&mut session, 0, 101, 48_000, 16, 2),
        Err(HdaError::InvalidParameter(_))
    ));
    assert!(matches!(
        controller.setup_playback(&mut session, 5, 50, 48_000, 16, 2),
        Err(HdaError::InvalidParameter(_))
    ));
    assert!(matches!(
        controller.begin_playback(&mut session, &[0u8; 64], 0),
        Err(HdaError::NotReady(_))
    ));
}

#[test]
fn second_setup_moves_output_to_the_new_pin() {
    let (mut controller, platform) = bind(sim_with(two_port_codec()));
    let mut session = PlaybackSession::new();

    controller
        .setup_playback(&mut session, 0, 60, 48_000, 16, 2)
        .unwrap();
    assert_eq!(platform.pin_control(0, SPEAKER_PIN), Some(0x40));

    controller
        .setup_playback(&mut session, 1, 60, 48_000, 16, 2)
        .unwrap();
    assert_eq!(session.output(), Some(1));
    assert_eq!(platform.pin_control(0, SPEAKER_PIN).unwrap() & 0x40, 0);
    // Headphone-capable jack also gets HP_ENABLE.
    assert_eq!(platform.pin_control(0, HEADPHONE_PIN), Some(0xC0));
    assert_eq!(controller.stream_tags().in_use(), 1);

    let tag = controller.streams()[OUTPUT_STREAM].tag();
    let hda = platform.hda();
    let hp_dac = hda.codec_model(0).unwrap().node(HEADPHONE_DAC).unwrap();
    assert_eq!(hp_dac.stream_channel(), tag << 4);
    assert_eq!(hp_dac.converter_format(), 0x0011);
}

#[test]
fn zero_volume_mutes_the_path() {
    let (mut controller, platform) = bind(sim_with(speaker_codec()));
    let mut session = PlaybackSession::new();
    controller
        .setup_playback(&mut session, 0, 0, 48_000, 16, 2)
        .unwrap();

    let hda = platform.hda();
    let dac = hda.codec_model(0).unwrap().node(SPEAKER_DAC).unwrap();
    assert_eq!(dac.amp(true, true, 0), 0x80);
    assert_eq!(dac.amp(true, false, 0), 0x80);
}

#[test]
fn path_through_selector_and_mixer_is_programmed_hop_by_hop() {
    let codec = SimCodec::new(VENDOR_REALTEK_ALC662, PCM_44K1_48K_16)
        .widget(0x02, SimNode::dac().power_ctrl())
        .widget(0x03, SimNode::dac())
        .widget(0x0C, SimNode::mixer().connections(&[0x02]).in_amp(0x8000_1F1F))
        .widget(0x0D, SimNode::selector().connections(&[0x0C, 0x03]))
        .widget(
            0x21,
            SimNode::pin(PIN_CAP_OUTPUT | PIN_CAP_HP_DRIVE, CONFIG_FRONT_HEADPHONE)
                .connections(&[0x0D]),
        );
    let (mut controller, platform) = bind(sim_with(codec));
    let mut session = PlaybackSession::new();
    controller
        .setup_playback(&mut session, 0, 50, 48_000, 16, 2)
        .unwrap();

    let hda = platform.hda();
    let codec = hda.codec_model(0).unwrap();
    assert_eq!(codec.node(0x21).unwrap().pin_control(), 0xC0);
    assert_eq!(codec.node(0x0D).unwrap().conn_select(), 0);
    let mixer = codec.node(0x0C).unwrap();
    assert_eq!(mixer.amp(false, true, 0), 15);
    assert_eq!(mixer.amp(false, false, 0), 15);
    let dac = codec.node(0x02).unwrap();
    assert_eq!(dac.power_state(), 0);
    assert_eq!(dac.stream_channel(), 1 << 4);
    assert_eq!(dac.converter_format(), 0x0011);
    // The unused DAC is not part of the path.
    assert_eq!(codec.node(0x03).unwrap().stream_channel(), 0);
}

#[test]
fn setup_while_running_is_already_started_and_stop_releases_the_tag() {
    let (mut controller, platform, mut session) = configured_speaker();
    controller
        .begin_playback(&mut session, &pattern(64 * 1024), 0)
        .unwrap();
    assert_eq!(session.state(), PlaybackState::Running);

    assert!(matches!(
        controller.setup_playback(&mut session, 0, 80, 44_100, 16, 2),
        Err(HdaError::AlreadyStarted { .. })
    ));

    controller.stop_playback(&mut session).unwrap();
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);
    assert!(!platform.hda().stream(OUTPUT_STREAM).unwrap().is_running());

    assert!(matches!(
        controller.stop_playback(&mut session),
        Err(HdaError::NotReady(_))
    ));
}

#[test]
fn frozen_dma_trips_the_watchdog_in_the_blocking_path() {
    let (mut controller, platform, mut session) = configured_speaker();
    platform
        .hda_mut()
        .stream_mut(OUTPUT_STREAM)
        .unwrap()
        .set_frozen(true);

    let err = controller
        .start_playback(&mut session, &pattern(8192), 0)
        .unwrap_err();
    assert!(matches!(err, HdaError::DeviceError(_)));
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);
}

#[test]
fn unbind_stops_everything_and_frees_all_dma_memory() {
    let (mut controller, platform, mut session) = configured_speaker();
    controller
        .begin_playback(&mut session, &pattern(16 * 1024), 0)
        .unwrap();
    for _ in 0..20 {
        platform.stall(200);
        controller.poll_playback(&mut session).unwrap();
    }
    assert!(platform.live_allocations() > 0);

    let returned = controller.unbind();
    assert_eq!(returned.live_allocations(), 0);
    let hda = platform.hda();
    assert!(!hda.corb_running());
    assert!(!hda.rirb_running());
    assert!(!hda.stream(OUTPUT_STREAM).unwrap().is_running());
}

#[test]
fn converter_with_its_own_formats_overrides_the_group() {
    let pcm_192k_16 = (1 << 10) | (1 << 17);
    let codec = SimCodec::new(VENDOR_REALTEK_ALC662, PCM_44K1_48K_16)
        .widget(SPEAKER_DAC, SimNode::dac().pcm(pcm_192k_16))
        .widget(0x03, SimNode::dac().mono())
        .widget(
            SPEAKER_PIN,
            SimNode::pin(PIN_CAP_OUTPUT, CONFIG_INTERNAL_SPEAKER).connections(&[SPEAKER_DAC]),
        )
        .widget(
            HEADPHONE_PIN,
            SimNode::pin(PIN_CAP_OUTPUT, CONFIG_FRONT_HEADPHONE).connections(&[0x03]),
        );
    let (mut controller, platform) = bind(sim_with(codec));
    let mut session = PlaybackSession::new();

    controller
        .setup_playback(&mut session, 0, 50, 192_000, 16, 2)
        .unwrap();
    assert!(matches!(
        controller.setup_playback(&mut session, 0, 50, 48_000, 16, 2),
        Err(HdaError::Unsupported(_))
    ));
    // The mono DAC behind the headphone jack cannot take stereo.
    assert!(matches!(
        controller.setup_playback(&mut session, 1, 50, 48_000, 16, 2),
        Err(HdaError::Unsupported(_))
    ));
    controller
        .setup_playback(&mut session, 1, 50, 48_000, 16, 1)
        .unwrap();
    assert_eq!(platform.pin_control(0, HEADPHONE_PIN), Some(0x40));
    assert_eq!(platform.pin_control(0, SPEAKER_PIN).unwrap() & 0x40, 0);
}

#[test]
fn blocking_playback_runs_on_simulated_time() {
    let (mut controller, platform, mut session) = configured_speaker();
    let before = platform.clock_us();
    // 4096 bytes at 44.1 kHz stereo 16-bit is a little over 23 ms.
    controller
        .start_playback(&mut session, &pattern(4096), 0)
        .unwrap();
    assert!(platform.clock_us() - before >= 23_000);
}

#[test]
fn position_read_failure_stops_the_stream_and_frees_the_tag() {
    let (mut controller, platform, mut session) = configured_speaker();
    let lpib = stream_base(OUTPUT_STREAM) + SD_LPIB;
    platform.hda_mut().faults.failing_offset = Some(lpib);

    let err = controller
        .start_playback(&mut session, &pattern(8192), 0)
        .unwrap_err();
    assert!(matches!(err, HdaError::DeviceError(_)));
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);
    assert!(!platform.hda().stream(OUTPUT_STREAM).unwrap().is_running());

    // Same through the non-blocking pair.
    platform.hda_mut().faults.failing_offset = None;
    controller
        .setup_playback(&mut session, 0, 80, 44_100, 16, 2)
        .unwrap();
    controller
        .begin_playback(&mut session, &pattern(8192), 0)
        .unwrap();
    platform.hda_mut().faults.failing_offset = Some(lpib);
    platform.stall(200);
    assert!(matches!(
        controller.poll_playback(&mut session),
        Err(HdaError::DeviceError(_))
    ));
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);
    assert!(!platform.hda().stream(OUTPUT_STREAM).unwrap().is_running());
}

#[test]
fn failed_stop_still_releases_the_tag() {
    let (mut controller, platform, mut session) = configured_speaker();
    controller
        .begin_playback(&mut session, &pattern(64 * 1024), 0)
        .unwrap();

    platform.hda_mut().faults.failing_offset = Some(stream_base(OUTPUT_STREAM) + SD_CTL);
    assert!(matches!(
        controller.stop_playback(&mut session),
        Err(HdaError::DeviceError(_))
    ));
    assert_eq!(session.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);

    platform.hda_mut().faults.failing_offset = None;
    controller
        .setup_playback(&mut session, 0, 80, 44_100, 16, 2)
        .unwrap();
    assert_eq!(session.state(), PlaybackState::Configured);
    assert_eq!(controller.stream_tags().in_use(), 1);
    // Reprogramming the descriptor halted the DMA the failed stop left running.
    assert!(!platform.hda().stream(OUTPUT_STREAM).unwrap().is_running());
}

#[test]
fn polling_a_session_whose_stream_was_stopped_elsewhere_is_not_ready() {
    let (mut controller, _platform, mut session) = configured_speaker();
    controller
        .begin_playback(&mut session, &pattern(64 * 1024), 0)
        .unwrap();
    let mut stale = session.clone();

    controller.stop_playback(&mut session).unwrap();
    assert!(matches!(
        controller.poll_playback(&mut stale),
        Err(HdaError::NotReady(_))
    ));
    assert_eq!(stale.state(), PlaybackState::Idle);
    assert_eq!(controller.stream_tags().in_use(), 0);
}
