mod common;

use common::*;
use hda_audio::regs::{gcap_with_streams, ControllerCaps};
use hda_audio::stream::{RefillState, Stream, StreamDirection, StreamTags};
use hda_audio::{Controller, HdaError, PlaybackSession, PollOutcome, Stall, StreamFormat};
use hda_audio_sim::SimPlatform;

fn configured() -> (Controller<SimPlatform>, SimPlatform, PlaybackSession) {
    let (mut controller, platform) = bind(sim_with(speaker_codec()));
    let mut session = PlaybackSession::new();
    controller
        .setup_playback(&mut session, 0, 80, 48_000, 16, 2)
        .unwrap();
    (controller, platform, session)
}

/// Poll until completion, returning how many halves were refilled on the way.
fn run_to_completion(
    controller: &mut Controller<SimPlatform>,
    platform: &SimPlatform,
    session: &mut PlaybackSession,
) -> usize {
    let mut refills = 0;
    for _ in 0..10_000 {
        platform.stall(200);
        match controller.poll_playback(session).unwrap() {
            PollOutcome::Completed => return refills,
            PollOutcome::Refilled(_) => refills += 1,
            PollOutcome::Pending => {}
            PollOutcome::Idle => panic!("session went idle without completing"),
        }
    }
    panic!("playback never completed");
}

#[test]
fn source_shorter_than_a_half_completes_in_one_cycle() {
    let (mut controller, platform, mut session) = configured();
    controller
        .begin_playback(&mut session, &[0x11; 512], 0)
        .unwrap();

    let refills = run_to_completion(&mut controller, &platform, &mut session);
    assert_eq!(refills, 0);
    assert_eq!(
        platform.hda().stream(OUTPUT_STREAM).unwrap().completions(),
        1
    );

    let played = platform.played(OUTPUT_STREAM);
    assert_eq!(&played[..512], &[0x11; 512][..]);
    assert!(played[512..].iter().all(|b| *b == 0));
}

#[test]
fn long_source_is_streamed_through_both_halves_in_order() {
    let (mut controller, platform, mut session) = configured();
    let source = pattern(3 * 4096 + 100);
    controller.begin_playback(&mut session, &source, 0).unwrap();

    let refills = run_to_completion(&mut controller, &platform, &mut session);
    // Five refills carry source bytes; the sixth pads the half after the tail.
    assert_eq!(refills, 6);

    let played = platform.played(OUTPUT_STREAM);
    assert!(played.len() >= source.len());
    assert_eq!(&played[..source.len()], &source[..]);
    assert!(played[source.len()..].iter().all(|b| *b == 0));
}

#[test]
fn playback_starts_at_the_requested_offset() {
    let (mut controller, platform, mut session) = configured();
    let source = pattern(3000);
    controller
        .begin_playback(&mut session, &source, 1000)
        .unwrap();
    run_to_completion(&mut controller, &platform, &mut session);

    let played = platform.played(OUTPUT_STREAM);
    assert_eq!(&played[..2000], &source[1000..]);
}

#[test]
fn stopping_mid_stream_forgets_the_source_position() {
    let (mut controller, platform, mut session) = configured();
    controller
        .begin_playback(&mut session, &pattern(64 * 1024), 0)
        .unwrap();
    let mut refills = 0;
    while refills < 2 {
        platform.stall(200);
        if let PollOutcome::Refilled(_) = controller.poll_playback(&mut session).unwrap() {
            refills += 1;
        }
    }
    assert!(controller.streams()[OUTPUT_STREAM].cursor() > 4096);

    controller.stop_playback(&mut session).unwrap();
    let stream = &controller.streams()[OUTPUT_STREAM];
    assert_eq!(stream.cursor(), 0);
    assert!(!stream.is_armed());
}

#[test]
fn offset_past_the_end_is_rejected() {
    let (mut controller, _platform, mut session) = configured();
    assert!(matches!(
        controller.begin_playback(&mut session, &[0u8; 16], 17),
        Err(HdaError::InvalidParameter(_))
    ));
}

#[test]
fn capture_stream_drains_each_half_into_the_target() {
    init_tracing();
    let platform = SimPlatform::new(sim_with(speaker_codec()));
    let config = test_config();
    let caps = ControllerCaps::from_gcap(gcap_with_streams(1, 1, 0, true));
    let mut tags = StreamTags::new();

    let mut stream = Stream::new(&platform, 0, StreamDirection::Input, &caps, &config).unwrap();
    let format = StreamFormat::new(48_000, 16, 2).unwrap();
    stream
        .configure(&platform, &caps, &mut tags, format)
        .unwrap();

    let data = pattern(5000);
    platform
        .hda_mut()
        .stream_mut(0)
        .unwrap()
        .set_capture_source(data.clone());
    stream.start_capture(&platform, data.len()).unwrap();
    assert!(matches!(
        stream.start(&platform, &[0u8; 4], 0),
        Err(HdaError::InvalidParameter(_))
    ));

    let mut outcome = PollOutcome::Pending;
    for _ in 0..10_000 {
        platform.stall(200);
        outcome = stream.poll(&platform).unwrap();
        if outcome == PollOutcome::Completed {
            break;
        }
    }
    assert_eq!(outcome, PollOutcome::Completed);
    assert_eq!(stream.take_captured(), data);
    assert_eq!(stream.refill_state(), RefillState::AwaitingLowerHalf);

    stream.teardown(&platform, &mut tags).unwrap();
    assert_eq!(tags.in_use(), 0);
    assert_eq!(platform.live_allocations(), 0);
}
