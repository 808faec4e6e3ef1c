//! Input and output collaborators of the pipeline

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use encoder::{EncodedPacket, RawFrame};
use shared_types::{HwError, HwResult, PicStruct, SurfaceFormat};
use tracing::{debug, warn};

/// Finite sequence of raw frames; `None` marks end-of-stream
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> HwResult<Option<RawFrame>>;
}

/// Consumer of encoded packets, in submission order
pub trait PacketSink: Send {
    fn write_packet(&mut self, packet: &EncodedPacket) -> HwResult<()>;

    /// Called once after the last packet
    fn finish(&mut self) -> HwResult<()> {
        Ok(())
    }
}

/// Frames held in memory
#[derive(Debug, Default)]
pub struct VecFrameSource {
    frames: VecDeque<RawFrame>,
}

impl VecFrameSource {
    pub fn new(frames: impl IntoIterator<Item = RawFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// `count` frames whose bytes all equal the frame index (mod 256)
    pub fn synthetic(count: u64, width: u32, height: u32, format: SurfaceFormat) -> Self {
        let size = format.frame_size(width, height);
        Self::new((0..count).map(|i| RawFrame {
            data: Bytes::from(vec![i as u8; size]),
            width,
            height,
            format,
            pts: i as i64,
            pic_struct: PicStruct::Frame,
            sequence: i,
        }))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> HwResult<Option<RawFrame>> {
        Ok(self.frames.pop_front())
    }
}

/// Reads fixed-size raw frames back to back from a byte stream
pub struct RawFileSource<R = BufReader<File>> {
    reader: R,
    width: u32,
    height: u32,
    format: SurfaceFormat,
    pic_struct: PicStruct,
    frame_size: usize,
    frames_read: u64,
}

impl RawFileSource {
    pub fn open(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        format: SurfaceFormat,
    ) -> HwResult<Self> {
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::new(file), width, height, format))
    }
}

impl<R: Read + Send> RawFileSource<R> {
    pub fn from_reader(reader: R, width: u32, height: u32, format: SurfaceFormat) -> Self {
        Self {
            reader,
            width,
            height,
            format,
            pic_struct: PicStruct::Frame,
            frame_size: format.frame_size(width, height),
            frames_read: 0,
        }
    }

    /// Tag every frame with `pic_struct`
    pub fn with_pic_struct(mut self, pic_struct: PicStruct) -> Self {
        self.pic_struct = pic_struct;
        self
    }

    fn fill(&mut self, buf: &mut [u8]) -> HwResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Send> FrameSource for RawFileSource<R> {
    fn next_frame(&mut self) -> HwResult<Option<RawFrame>> {
        let mut buf = vec![0u8; self.frame_size];
        let filled = self.fill(&mut buf)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < buf.len() {
            return Err(HwError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "truncated frame {}: {} of {} bytes",
                    self.frames_read, filled, self.frame_size
                ),
            )));
        }

        let index = self.frames_read;
        self.frames_read += 1;
        Ok(Some(RawFrame {
            data: Bytes::from(buf),
            width: self.width,
            height: self.height,
            format: self.format,
            pts: index as i64,
            pic_struct: self.pic_struct,
            sequence: index,
        }))
    }
}

/// Runs another source on a reader thread behind a bounded channel
///
/// The reader blocks once `depth` frames are queued.
pub struct BoundedFrameSource {
    rx: Option<Receiver<HwResult<RawFrame>>>,
    reader: Option<JoinHandle<()>>,
}

impl BoundedFrameSource {
    pub fn spawn(mut inner: Box<dyn FrameSource>, depth: usize) -> HwResult<Self> {
        let (tx, rx) = bounded::<HwResult<RawFrame>>(depth.max(1));

        let reader = std::thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || {
                let mut sent = 0u64;
                loop {
                    match inner.next_frame() {
                        Ok(Some(frame)) => {
                            if tx.send(Ok(frame)).is_err() {
                                break;
                            }
                            sent += 1;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            break;
                        }
                    }
                }
                debug!(frames = sent, "Frame reader finished");
            })?;

        Ok(Self {
            rx: Some(rx),
            reader: Some(reader),
        })
    }
}

impl FrameSource for BoundedFrameSource {
    fn next_frame(&mut self) -> HwResult<Option<RawFrame>> {
        let Some(rx) = &self.rx else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => Err(e),
            // Reader exited and the queue is empty
            Err(_) => Ok(None),
        }
    }
}

impl Drop for BoundedFrameSource {
    fn drop(&mut self) {
        // Unblocks a reader waiting on a full queue
        self.rx.take();
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Frame reader thread panicked");
            }
        }
    }
}

/// Collects packets in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    packets: Arc<Mutex<Vec<EncodedPacket>>>,
    finished: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> Vec<EncodedPacket> {
        self.packets.lock().clone()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.packets.lock().iter().map(|p| p.sequence).collect()
    }

    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }
}

impl PacketSink for MemorySink {
    fn write_packet(&mut self, packet: &EncodedPacket) -> HwResult<()> {
        self.packets.lock().push(packet.clone());
        Ok(())
    }

    fn finish(&mut self) -> HwResult<()> {
        *self.finished.lock() = true;
        Ok(())
    }
}

/// Writes the elementary stream to a file
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> HwResult<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl PacketSink for FileSink {
    fn write_packet(&mut self, packet: &EncodedPacket) -> HwResult<()> {
        self.writer.write_all(&packet.data)?;
        Ok(())
    }

    fn finish(&mut self) -> HwResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
