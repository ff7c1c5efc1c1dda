//! Async hosting for a [`Transmuxer`].
//!
//! The transmuxer itself is synchronous. [`spawn`] moves one into a tokio
//! task that serves [`HostMessage`]s strictly in the order they were sent and
//! hands every event to an [`EventSink`].
//!
//! ```rust
//! use vdkmux::config::TransmuxerOptions;
//! use vdkmux::host;
//! use vdkmux::transmuxer::TransmuxerEvent;
//! use tokio::sync::mpsc;
//!
//! # tokio_test::block_on(async {
//! let (tx, mut rx) = mpsc::channel::<TransmuxerEvent>(16);
//! let handle = host::spawn(TransmuxerOptions::default(), tx);
//! handle.flush().await?;
//! handle.close().await?;
//!
//! assert_eq!(rx.recv().await, Some(TransmuxerEvent::Done));
//! # Ok::<(), vdkmux::VdkError>(())
//! # }).unwrap();
//! ```

use crate::config::TransmuxerOptions;
use crate::error::{Result, VdkError};
use crate::format::ts::TS_PACKET_SIZE;
use crate::transmuxer::{GopInfo, Transmuxer, TransmuxerEvent};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 64;

/// Requests served by a hosted transmuxer
#[derive(Debug, Clone, PartialEq)]
pub enum HostMessage {
    /// A chunk of TS or ADTS input
    Push(Bytes),
    /// [`Transmuxer::flush`]
    Flush,
    /// [`Transmuxer::partial_flush`]
    PartialFlush,
    /// [`Transmuxer::end_timeline`]
    EndTimeline,
    /// [`Transmuxer::reset`]
    Reset,
    /// [`Transmuxer::reset_captions`]
    ResetCaptions,
    /// New output timeline start, 90kHz
    SetBaseMediaDecodeTime(u64),
    /// Combine audio and video into one segment
    SetRemux(bool),
    /// GOPs of another rendition to align video fragments to
    AlignGopsWith(Vec<GopInfo>),
}

/// Where a hosted transmuxer delivers its events.
#[async_trait]
pub trait EventSink: Send {
    /// Delivers one event; an error stops the host task
    async fn send(&mut self, event: TransmuxerEvent) -> Result<()>;
}

#[async_trait]
impl EventSink for mpsc::Sender<TransmuxerEvent> {
    async fn send(&mut self, event: TransmuxerEvent) -> Result<()> {
        mpsc::Sender::send(self, event)
            .await
            .map_err(|_| VdkError::Protocol("event receiver dropped".into()))
    }
}

#[async_trait]
impl EventSink for mpsc::UnboundedSender<TransmuxerEvent> {
    async fn send(&mut self, event: TransmuxerEvent) -> Result<()> {
        mpsc::UnboundedSender::send(self, event)
            .map_err(|_| VdkError::Protocol("event receiver dropped".into()))
    }
}

/// Sending side of a hosted transmuxer.
pub struct TransmuxerHandle {
    sender: mpsc::Sender<HostMessage>,
    task: JoinHandle<Result<()>>,
}

impl TransmuxerHandle {
    /// Queues `message`, waiting while the channel is full.
    ///
    /// Fails once the task has stopped, either after [`close`](Self::close)
    /// or because the sink returned an error.
    pub async fn send(&self, message: HostMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| VdkError::Protocol("transmuxer task has stopped".into()))
    }

    /// Queues a [`HostMessage::Push`]
    pub async fn push(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send(HostMessage::Push(data.into())).await
    }

    /// Queues a [`HostMessage::Flush`]
    pub async fn flush(&self) -> Result<()> {
        self.send(HostMessage::Flush).await
    }

    /// Queues a [`HostMessage::PartialFlush`]
    pub async fn partial_flush(&self) -> Result<()> {
        self.send(HostMessage::PartialFlush).await
    }

    /// Queues a [`HostMessage::EndTimeline`]
    pub async fn end_timeline(&self) -> Result<()> {
        self.send(HostMessage::EndTimeline).await
    }

    /// Queues a [`HostMessage::Reset`]
    pub async fn reset(&self) -> Result<()> {
        self.send(HostMessage::Reset).await
    }

    /// Stops accepting messages and waits until every queued one was served
    pub async fn close(self) -> Result<()> {
        drop(self.sender);
        self.task
            .await
            .map_err(|e| VdkError::Protocol(format!("transmuxer task failed: {}", e)))?
    }
}

/// Runs a transmuxer on its own tokio task.
pub fn spawn<S>(options: TransmuxerOptions, sink: S) -> TransmuxerHandle
where
    S: EventSink + 'static,
{
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(serve(Transmuxer::new(options), receiver, sink));
    TransmuxerHandle { sender, task }
}

async fn serve<S: EventSink>(
    mut transmuxer: Transmuxer,
    mut receiver: mpsc::Receiver<HostMessage>,
    mut sink: S,
) -> Result<()> {
    while let Some(message) = receiver.recv().await {
        apply(&mut transmuxer, message);
        for event in transmuxer.take_events() {
            sink.send(event).await?;
        }
    }
    log::debug!("host channel closed");
    Ok(())
}

fn apply(transmuxer: &mut Transmuxer, message: HostMessage) {
    match message {
        HostMessage::Push(data) => transmuxer.push_bytes(data),
        HostMessage::Flush => transmuxer.flush(),
        HostMessage::PartialFlush => transmuxer.partial_flush(),
        HostMessage::EndTimeline => transmuxer.end_timeline(),
        HostMessage::Reset => transmuxer.reset(),
        HostMessage::ResetCaptions => transmuxer.reset_captions(),
        HostMessage::SetBaseMediaDecodeTime(time) => transmuxer.set_base_media_decode_time(time),
        HostMessage::SetRemux(remux) => transmuxer.set_remux(remux),
        HostMessage::AlignGopsWith(gops) => transmuxer.align_gops_with(gops),
    }
}

/// Transmuxes a whole source as one segment.
///
/// `chunk_size` is rounded up to one transport packet.
pub async fn transmux_reader<R>(
    mut reader: R,
    options: TransmuxerOptions,
    chunk_size: usize,
) -> Result<Vec<TransmuxerEvent>>
where
    R: AsyncRead + Unpin,
{
    let mut transmuxer = Transmuxer::new(options);
    let mut buf = vec![0u8; chunk_size.max(TS_PACKET_SIZE)];
    let mut total = 0;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n;
        transmuxer.push(&buf[..n]);
    }
    log::debug!("read {} bytes", total);

    transmuxer.flush();
    Ok(transmuxer.take_events())
}
