use std::collections::HashSet;

use tracing::trace;

use super::{VCDUHeader, Vcid};

/// Passes only frames for a set of virtual channels, keeping count of frames seen and
/// frames passed.
///
/// Fill frames never pass unless the fill VCID is explicitly included.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    vcids: HashSet<Vcid>,
    total: u64,
    matched: u64,
}

impl ChannelFilter {
    pub fn new(vcids: &[Vcid]) -> Self {
        ChannelFilter {
            vcids: vcids.iter().copied().collect(),
            total: 0,
            matched: 0,
        }
    }

    /// Returns true if a frame with `header` should be passed on for demultiplexing.
    pub fn accept(&mut self, header: &VCDUHeader) -> bool {
        self.total += 1;
        if self.vcids.contains(&header.vcid) {
            self.matched += 1;
            true
        } else {
            trace!(vcid = header.vcid, counter = header.counter, "skipping frame");
            false
        }
    }

    /// Number of frames checked.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of frames accepted.
    pub fn matched(&self) -> u64 {
        self.matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(vcid: Vcid, counter: u32) -> VCDUHeader {
        VCDUHeader {
            version: 1,
            scid: 12,
            vcid,
            counter,
            replay: false,
            cycle: false,
            counter_cycle: 0,
        }
    }

    #[test]
    fn passes_only_target_channel() {
        let mut filter = ChannelFilter::new(&[12]);
        let frames = [header(12, 0), header(9, 0), header(12, 1)];

        let passed: Vec<u32> = frames
            .iter()
            .filter(|h| filter.accept(h))
            .map(|h| h.counter)
            .collect();

        assert_eq!(passed, vec![0, 1]);
        assert_eq!(filter.matched(), 2);
        assert_eq!(filter.total(), 3);
    }

    #[test]
    fn fill_is_dropped() {
        let mut filter = ChannelFilter::new(&[12, 34]);
        assert!(!filter.accept(&header(VCDUHeader::FILL, 0)));
        assert!(filter.accept(&header(34, 0)));
        assert_eq!(filter.matched(), 1);
    }
}
