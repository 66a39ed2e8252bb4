//! Playback façade: `Idle → Configured → Running → Idle`, one output path at a time.

use tracing::{debug, info, trace, warn};

use crate::codec::{FunctionGroup, OutputPort};
use crate::controller::Controller;
use crate::error::{HdaError, Result};
use crate::format::StreamFormat;
use crate::path;
use crate::platform::Platform;
use crate::stream::PollOutcome;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PlaybackState {
    Idle,
    Configured,
    Running,
}

/// Caller-owned playback state. One session drives one output path on one stream.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    state: PlaybackState,
    output: Option<usize>,
    stream: Option<usize>,
    format: Option<StreamFormat>,
    volume: u8,
    last_position: Option<u32>,
    stalled_polls: u32,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            output: None,
            stream: None,
            format: None,
            volume: 0,
            last_position: None,
            stalled_polls: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Output port index of the configured path.
    pub fn output(&self) -> Option<usize> {
        self.output
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<P: Platform> Controller<P> {
    /// Validate the request against the port's DAC, then claim a stream tag and program the
    /// path. Nothing is touched unless every check passes.
    pub fn setup_playback(
        &mut self,
        session: &mut PlaybackSession,
        output: usize,
        volume: u8,
        frequency: u32,
        bits: u8,
        channels: u8,
    ) -> Result<()> {
        if session.state == PlaybackState::Running {
            let stream = session.stream.unwrap_or_default();
            return Err(HdaError::AlreadyStarted {
                stream,
                tag: self.streams.get(stream).map_or(0, |s| s.tag()),
            });
        }
        if volume > 100 {
            return Err(HdaError::InvalidParameter("volume must be 0..=100"));
        }
        let port = *self
            .outputs
            .get(output)
            .ok_or(HdaError::InvalidParameter("no such output port"))?;
        let format = StreamFormat::new(frequency, bits, channels)?;
        let group = self.port_group(&port)?;
        path::check_format(group, port.pin, &format)?;
        let stream_index = self.playback_stream()?;

        // Drop the previous configuration before claiming a new tag.
        if let Some(previous) = session.stream.take() {
            if let Some(stream) = self.streams.get_mut(previous) {
                stream.release(&self.platform, &mut self.tags)?;
            }
        }
        session.reset();

        for other in self.outputs.iter().filter(|p| p.index != port.index) {
            let group = self.port_group(other)?;
            path::disable_widget_path(&*self, other.codec, group, other.pin)?;
        }

        let tag = self.streams[stream_index].configure(
            &self.platform,
            &self.caps,
            &mut self.tags,
            format,
        )?;

        let group = self.port_group(&port)?;
        if let Err(err) =
            path::enable_widget_path(&*self, port.codec, group, port.pin, volume, tag, &format)
        {
            self.streams[stream_index].release(&self.platform, &mut self.tags)?;
            return Err(err);
        }

        session.state = PlaybackState::Configured;
        session.output = Some(output);
        session.stream = Some(stream_index);
        session.format = Some(format);
        session.volume = volume;
        info!(
            output,
            device = ?port.device,
            rate = frequency,
            bits,
            channels,
            volume,
            tag,
            "playback configured"
        );
        Ok(())
    }

    fn port_group(&self, port: &OutputPort) -> Result<&FunctionGroup> {
        self.codec(port.codec)
            .and_then(|codec| codec.group(port.group))
            .ok_or(HdaError::NotFound("output port's function group vanished"))
    }

    /// Start playing `buffer[offset..]` and return immediately. Drive it with
    /// [`Controller::poll_playback`].
    pub fn begin_playback(
        &mut self,
        session: &mut PlaybackSession,
        buffer: &[u8],
        offset: usize,
    ) -> Result<()> {
        let index = match (session.state, session.stream) {
            (PlaybackState::Configured | PlaybackState::Running, Some(index)) => index,
            _ => return Err(HdaError::NotReady("playback is not configured")),
        };
        if session.state == PlaybackState::Running {
            self.streams[index].stop(&self.platform)?;
        }
        self.streams[index].start(&self.platform, buffer, offset)?;
        session.state = PlaybackState::Running;
        session.last_position = None;
        session.stalled_polls = 0;
        debug!(stream = index, bytes = buffer.len() - offset, "playback started");
        Ok(())
    }

    /// One periodic tick: refill the stream and watch for completion or a stalled DMA engine.
    ///
    /// `Completed` means the session went back to `Idle` and released its tag.
    pub fn poll_playback(&mut self, session: &mut PlaybackSession) -> Result<PollOutcome> {
        let Some(index) = session.stream else {
            return Ok(PollOutcome::Idle);
        };
        if session.state != PlaybackState::Running {
            return Ok(PollOutcome::Idle);
        }

        let outcome = match self.streams[index].poll(&self.platform) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.abort(session, index, err)),
        };

        match outcome {
            PollOutcome::Completed => {
                self.finish(session, index)?;
                info!(stream = index, "playback completed");
            }
            PollOutcome::Pending => {
                let position = match self.streams[index].position(&self.platform) {
                    Ok(position) => position,
                    Err(err) => return Err(self.abort(session, index, err)),
                };
                if session.last_position == Some(position) {
                    session.stalled_polls += 1;
                } else {
                    session.stalled_polls = 0;
                    session.last_position = Some(position);
                }
                if session.stalled_polls > self.config.stall_watchdog_polls {
                    debug!(stream = index, position, "DMA position stuck");
                    let err = HdaError::DeviceError("stream DMA made no progress");
                    return Err(self.abort(session, index, err));
                }
            }
            PollOutcome::Refilled(half) => {
                session.stalled_polls = 0;
                session.last_position = None;
                trace!(stream = index, ?half, "playback refilled");
            }
            PollOutcome::Idle => {
                // Another session stopped the stream underneath this one.
                warn!(stream = index, "stream disarmed under a running session");
                session.reset();
                return Err(HdaError::NotReady("stream was stopped by another session"));
            }
        }
        Ok(outcome)
    }

    /// Play `buffer[offset..]` to the end, polling every `poll_interval_us`.
    pub fn start_playback(
        &mut self,
        session: &mut PlaybackSession,
        buffer: &[u8],
        offset: usize,
    ) -> Result<()> {
        self.begin_playback(session, buffer, offset)?;
        let index = session.stream.unwrap_or_default();
        loop {
            self.platform.stall(self.config.poll_interval_us);
            match self.poll_playback(session)? {
                PollOutcome::Completed => return Ok(()),
                PollOutcome::Idle => {
                    return Err(HdaError::NotReady("playback stopped before it completed"));
                }
                PollOutcome::Pending | PollOutcome::Refilled(_) => {}
            }
            match self.streams[index].is_running(&self.platform) {
                Ok(true) => {}
                Ok(false) => {
                    let err = HdaError::DeviceError("stream stopped unexpectedly");
                    return Err(self.abort(session, index, err));
                }
                Err(err) => return Err(self.abort(session, index, err)),
            }
        }
    }

    /// Halt the stream and release its tag.
    pub fn stop_playback(&mut self, session: &mut PlaybackSession) -> Result<()> {
        let Some(index) = session.stream else {
            return Err(HdaError::NotReady("no stream tag held"));
        };
        self.finish(session, index)?;
        info!(stream = index, "playback stopped");
        Ok(())
    }

    /// Stop the stream and give its tag back. The tag is released even when the stop fails;
    /// the first error is returned.
    fn finish(&mut self, session: &mut PlaybackSession, index: usize) -> Result<()> {
        session.reset();
        let stream = &mut self.streams[index];
        let stopped = stream.stop(&self.platform);
        let released = stream.release(&self.platform, &mut self.tags);
        stopped.and(released)
    }

    /// Tear the session down after `err` and hand `err` back to the caller.
    fn abort(&mut self, session: &mut PlaybackSession, index: usize, err: HdaError) -> HdaError {
        warn!(stream = index, %err, "stopping playback");
        if let Err(stop_err) = self.finish(session, index) {
            warn!(stream = index, %stop_err, "stream did not stop cleanly");
        }
        err
    }
}
