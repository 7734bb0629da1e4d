use std::{
    collections::{vec_deque::Drain, HashMap, VecDeque},
    fmt::Display,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::spacepacket::{Packet, PrimaryHeader};

use super::{missing_frames, Frame, FrameFormat, Vcid};

struct VcidTracker {
    vcid: Vcid,
    /// Caches partial packets for this vcid
    cache: Vec<u8>,
    // True when a FHP has been found and data should be added to cache. False
    // where there is a missing data due to missing frames or a bad header.
    sync: bool,
    // Counter of the last frame seen for this vcid
    last_counter: Option<u32>,
}

impl VcidTracker {
    fn new(vcid: Vcid) -> Self {
        VcidTracker {
            vcid,
            sync: false,
            cache: vec![],
            last_counter: None,
        }
    }

    /// True if some, but not all, of a packet has been collected.
    fn in_progress(&self) -> bool {
        self.sync && !self.cache.is_empty()
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.sync = false;
    }
}

impl Display for VcidTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VcidTracker{{vcid={}, sync={}, cache_len={}}}",
            self.vcid,
            self.sync,
            self.cache.len(),
        )
    }
}

/// Counts kept by a [Demuxer].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemuxStats {
    /// Frames provided to the demuxer, including fill.
    pub frames: u64,
    /// Sum of frame counter discontinuities.
    pub missing_frames: u64,
    /// Complete packets produced.
    pub packets: u64,
    /// Packets abandoned because of missing frames or the end of the stream.
    pub lost: u64,
    /// Corrupt first-header pointers or packet primary headers.
    pub invalid: u64,
}

/// Reassembles space packets from the M_PDUs of a sequence of frames.
///
/// Packets are produced in the order they are completed, per VCID. One partial packet is
/// kept for each VCID. The first packet header is located using the M_PDU first-header
/// pointer; after that packets are expected back to back until sync is lost.
///
/// Packet data is dropped, and counted in [DemuxStats], in these cases:
///
/// * A discontinuity in the frame counter from the previous frame of the same VCID drops the
///   in-progress packet. The current frame is still used to resync.
/// * A first-header pointer beyond the M_PDU data zone.
/// * A packet primary header that is not a version 0 telemetry header.
/// * Data for a packet that is still incomplete when [Demuxer::finish] is called.
///
/// Frames before the first frame with a packet header, and fill frames, are skipped.
///
/// # Example
/// ```
/// use downlink::framing::{Demuxer, Frame};
///
/// let mut demuxer = Demuxer::new(0, 0);
/// let frame = Frame::decode(vec![0u8; 1020]).unwrap();
/// let packets: Vec<_> = demuxer.push(&frame).collect();
/// demuxer.finish();
/// assert_eq!(demuxer.stats().frames, 1);
/// ```
pub struct Demuxer {
    izone_length: usize,
    trailer_length: usize,
    trackers: HashMap<Vcid, VcidTracker>,
    ready: VecDeque<Packet>,
    stats: DemuxStats,
}

impl Demuxer {
    /// # Arguments
    /// * `izone_length` is the number of bytes used for the Insert Zone, i.e., extra data
    ///   inserted between the transfer frame header and data field.
    /// * `trailer_length` is the number of bytes of data after the M_PDU, e.g., the
    ///   operational control field.
    pub fn new(izone_length: usize, trailer_length: usize) -> Self {
        Demuxer {
            izone_length,
            trailer_length,
            trackers: HashMap::default(),
            ready: VecDeque::default(),
            stats: DemuxStats::default(),
        }
    }

    /// Demuxer for frames decoded using `format`. Frame data does not include the sync
    /// marker, so only the insert zone and trailer are relevant.
    pub fn for_format(format: &FrameFormat) -> Self {
        Self::new(format.izone_len, format.trailer_len)
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Add a frame's data, returning any packets completed by it.
    pub fn push(&mut self, frame: &Frame) -> Drain<'_, Packet> {
        self.stats.frames += 1;
        self.collect(frame);
        self.ready.drain(..)
    }

    /// End of input. Any partial packets are dropped and counted as lost.
    pub fn finish(&mut self) {
        for tracker in self.trackers.values_mut() {
            if tracker.in_progress() {
                debug!(tracker = %tracker, "stream ended with partial packet, dropping");
                self.stats.lost += 1;
            }
            tracker.reset();
        }
    }

    fn collect(&mut self, frame: &Frame) {
        if frame.is_fill() {
            return;
        }
        let header = &frame.header;
        let Some(mpdu) = frame.mpdu(self.izone_length, self.trailer_length) else {
            debug!(vcid = header.vcid, len = frame.data.len(), "frame too short for mpdu");
            self.stats.invalid += 1;
            return;
        };
        let tracker = self
            .trackers
            .entry(header.vcid)
            .or_insert_with(|| VcidTracker::new(header.vcid));

        // A frame counter discontinuity means there are frames missing _before_ this one
        // -- this one is still useable, so drop the partial packet and resync.
        if let Some(last) = tracker.last_counter {
            let missing = if header.counter == last {
                debug!(vcid = header.vcid, counter = header.counter, "repeated frame counter");
                None
            } else {
                Some(missing_frames(header.counter, last))
            };
            if missing != Some(0) {
                self.stats.missing_frames += u64::from(missing.unwrap_or_default());
                if tracker.in_progress() {
                    self.stats.lost += 1;
                }
                trace!(vcid = header.vcid, tracker = %tracker, ?missing, "frame discontinuity, dropping tracker");
                tracker.reset();
            }
        }
        tracker.last_counter = Some(header.counter);

        if tracker.sync {
            tracker.cache.extend_from_slice(mpdu.payload());
        } else {
            // No way to get sync if we don't have a packet header
            if !mpdu.has_header() || mpdu.is_fill() {
                trace!(vcid = header.vcid, tracker = %tracker, "no packet header in mpdu, skipping");
                return;
            }
            if mpdu.header_offset() > mpdu.payload().len() {
                debug!(
                    "invalid MPDU header offset; value={} buf size={}",
                    mpdu.header_offset(),
                    mpdu.payload().len()
                );
                self.stats.invalid += 1;
                return;
            }
            tracker.sync = true;
            tracker.cache = mpdu.payload()[mpdu.header_offset()..].to_vec();
        }

        // The start of the cache always contains a packet primary header. Keep taking
        // packets while the cache holds complete ones.
        while let Some(header) = PrimaryHeader::decode(&tracker.cache) {
            if header.version != 0 || header.type_flag != 0 {
                warn!(vcid = tracker.vcid, "bad packet version or type, dropping {header:?}");
                self.stats.invalid += 1;
                tracker.reset();
                break;
            }
            let need = header.packet_len();
            if tracker.cache.len() < need {
                break;
            }
            let data: Vec<u8> = tracker.cache.drain(..need).collect();
            self.stats.packets += 1;
            self.ready.push_back(Packet { header, data });
        }
    }
}

struct FramedPacketIter<I>
where
    I: Iterator<Item = Frame>,
{
    frames: I,
    demuxer: Demuxer,
    ready: VecDeque<Packet>,
    done: bool,
}

impl<I> Iterator for FramedPacketIter<I>
where
    I: Iterator<Item = Frame>,
{
    type Item = Packet;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(packet) = self.ready.pop_front() {
                return Some(packet);
            }
            if self.done {
                return None;
            }
            match self.frames.next() {
                Some(frame) => self.ready.extend(self.demuxer.push(&frame)),
                None => {
                    trace!("no more frames");
                    self.demuxer.finish();
                    self.done = true;
                }
            }
        }
    }
}

/// Decode frame data into spacepackets.
///
/// This is a pull-based convenience over [Demuxer] for when packet counts are not needed.
/// Packets are decoded in the order in which they are received, per VCID.
///
/// # Example
/// ```
/// use downlink::framing::{Frame, packet_decoder};
/// use downlink::spacepacket::Packet;
///
/// let frames = vec![Frame::decode(vec![0u8; 1020]).unwrap()];
/// let packets: Vec<Packet> = packet_decoder(frames.into_iter(), 0, 0).collect();
/// ```
pub fn packet_decoder<I>(
    frames: I,
    izone_length: usize,
    trailer_length: usize,
) -> impl Iterator<Item = Packet>
where
    I: Iterator<Item = Frame>,
{
    FramedPacketIter {
        frames,
        demuxer: Demuxer::new(izone_length, trailer_length),
        ready: VecDeque::default(),
        done: false,
    }
}
