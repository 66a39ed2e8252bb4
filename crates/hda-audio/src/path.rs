//! Output path resolution and programming: pin → (selectors/mixers) → DAC.

use tracing::debug;

use crate::codec::FunctionGroup;
use crate::error::{HdaError, Result};
use crate::format::StreamFormat;
use crate::verb::*;
use crate::widget::*;

/// The chain of widgets from `pin` to its DAC, following the first connection of each hop.
///
/// The chain may not be longer than the group has widgets; a longer walk means a cycle.
pub fn trace_path(group: &FunctionGroup, pin: u8) -> Result<Vec<&Widget>> {
    let mut current = group
        .widget(pin)
        .ok_or(HdaError::NotFound("output pin is not in the function group"))?;
    let mut path = vec![current];
    for _ in 0..group.widgets.len() {
        if current.kind == WidgetKind::AudioOutput {
            return Ok(path);
        }
        let next = current
            .connections
            .first()
            .ok_or(HdaError::NotFound("path ends before reaching a DAC"))?;
        current = group
            .widget(*next)
            .ok_or(HdaError::NotFound("path references a missing widget"))?;
        path.push(current);
    }
    if current.kind == WidgetKind::AudioOutput {
        return Ok(path);
    }
    Err(HdaError::NotFound("no DAC within the widget count (cycle)"))
}

/// The Audio Output widget that feeds `pin`.
pub fn output_dac(group: &FunctionGroup, pin: u8) -> Result<&Widget> {
    let path = trace_path(group, pin)?;
    path.last()
        .copied()
        .ok_or(HdaError::NotFound("empty path"))
}

/// Check that the DAC feeding `pin` can take `format`, without touching the hardware.
pub fn check_format<'g>(
    group: &'g FunctionGroup,
    pin: u8,
    format: &StreamFormat,
) -> Result<&'g Widget> {
    let dac = output_dac(group, pin)?;
    let pcm = group
        .converter_pcm(dac)
        .ok_or(HdaError::Unsupported("DAC reports no PCM capabilities"))?;
    if !pcm.supports_rate(format.sample_rate) {
        return Err(HdaError::Unsupported("DAC does not support the sample rate"));
    }
    if !pcm.supports_bits(format.bits_per_sample) {
        return Err(HdaError::Unsupported("DAC does not support the bit depth"));
    }
    if format.channels > dac.channels() {
        return Err(HdaError::Unsupported("DAC has fewer channels than requested"));
    }
    Ok(dac)
}

fn amp_channels(widget: &Widget) -> &'static [AmpChannel] {
    if widget.is_stereo() {
        &[AmpChannel::Left, AmpChannel::Right]
    } else {
        &[AmpChannel::Left]
    }
}

fn push_amp_verbs(verbs: &mut Vec<Verb>, widget: &Widget, dir: AmpDir, amp: &Amp, volume: u8) {
    let gain = amp.caps.gain_for_volume(volume);
    let mute = volume == 0;
    for &channel in amp_channels(widget) {
        verbs.push(Verb::set_amp_gain_mute(dir, channel, 0, mute, gain));
    }
}

/// Program every widget between `pin` and its DAC for playback on stream `tag`.
pub fn enable_widget_path<S: CommandSink + ?Sized>(
    sink: &S,
    codec: u8,
    group: &FunctionGroup,
    pin: u8,
    volume: u8,
    tag: u8,
    format: &StreamFormat,
) -> Result<()> {
    check_format(group, pin, format)?;
    let fmt = format.to_hda_fmt()?;
    let path = trace_path(group, pin)?;

    for widget in &path {
        let mut verbs = Vec::new();
        if widget.caps.contains(WidgetCaps::POWER_CTRL) {
            verbs.push(Verb::set_power_state(POWER_STATE_D0));
        }
        if widget.kind != WidgetKind::Mixer && widget.connections.len() > 1 {
            verbs.push(Verb::set_connection_select(0));
        }
        if let Some(amp) = &widget.input_amp {
            if !widget.connections.is_empty() {
                push_amp_verbs(&mut verbs, widget, AmpDir::Input, amp, volume);
            }
        }
        if let Some(amp) = &widget.output_amp {
            push_amp_verbs(&mut verbs, widget, AmpDir::Output, amp, volume);
        }

        match widget.kind {
            WidgetKind::AudioOutput => {
                verbs.push(Verb::set_stream_channel(tag, 0));
                verbs.push(Verb::set_converter_format(fmt));
            }
            WidgetKind::PinComplex if widget.nid == pin => {
                let info = widget.pin();
                let current = info.and_then(|p| p.control).unwrap_or(PinControl::empty());
                let mut control = (current & PinControl::VREF_MASK) | PinControl::OUT_ENABLE;
                let pin_caps = info.and_then(|p| p.caps).unwrap_or(PinCaps::empty());
                let headphone = info
                    .and_then(|p| p.config)
                    .is_some_and(|c| c.device == DeviceKind::Headphone);
                if headphone && pin_caps.contains(PinCaps::HEADPHONE_DRIVE) {
                    control |= PinControl::HP_ENABLE;
                }
                verbs.push(Verb::set_pin_control(control.bits()));
                if pin_caps.contains(PinCaps::EAPD) {
                    let eapd = info.and_then(|p| p.eapd).unwrap_or(0);
                    verbs.push(Verb::set_eapd_btl(eapd | EAPD_BTL_EAPD));
                }
            }
            _ => {}
        }

        if !verbs.is_empty() {
            debug!(
                codec,
                nid = widget.nid,
                kind = ?widget.kind,
                verbs = verbs.len(),
                "programming path widget"
            );
            sink.send_commands(codec, widget.nid, &verbs)?;
        }
    }
    Ok(())
}

/// Stop `pin` from driving its jack. The rest of the path is left as programmed.
pub fn disable_widget_path<S: CommandSink + ?Sized>(
    sink: &S,
    codec: u8,
    group: &FunctionGroup,
    pin: u8,
) -> Result<()> {
    let widget = group
        .widget(pin)
        .ok_or(HdaError::NotFound("output pin is not in the function group"))?;
    if widget.kind != WidgetKind::PinComplex {
        return Err(HdaError::InvalidParameter("widget is not a pin complex"));
    }
    let current = sink.send_command(codec, pin, Verb::new(VERB_GET_PIN_CONTROL, 0))?;
    let control = PinControl::from_bits_retain(current as u8)
        .difference(PinControl::OUT_ENABLE | PinControl::HP_ENABLE);
    sink.send_command(codec, pin, Verb::set_pin_control(control.bits()))?;
    debug!(codec, pin, "output pin disabled");
    Ok(())
}
