//! Station parameters and the per-session station history.

use hifitime::prelude::Epoch;

/// How the antenna delta of a [StationInfo] is expressed.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum DeltaKind {
    /// East / North / Up, relative to the marker.
    #[default]
    Enu,
    /// ECEF X/Y/Z offset.
    Xyz,
}

/// Station parameters, as decoded from the stream.
#[derive(Debug, Default, Clone)]
pub struct StationInfo {
    pub marker_name: String,
    pub marker_number: String,

    pub antenna_descriptor: String,
    pub antenna_serial: String,

    pub receiver_descriptor: String,
    pub receiver_serial: String,
    pub receiver_version: String,

    /// ECEF position [m], all zero when unknown.
    pub position: [f64; 3],

    /// Antenna offset, interpreted per [DeltaKind].
    pub delta: [f64; 3],
    pub delta_kind: DeltaKind,

    /// Antenna height [m]
    pub height: f64,
}

impl StationInfo {
    pub fn has_position(&self) -> bool {
        self.position.iter().any(|v| *v != 0.0)
    }

    pub fn has_delta(&self) -> bool {
        self.delta.iter().any(|v| *v != 0.0)
    }
}

/// One station occupation interval.
#[derive(Debug, Clone)]
pub struct StationNode {
    pub staid: u32,
    /// First observation carrying this station id.
    pub ts: Epoch,
    /// Last observation carrying this station id.
    pub te: Epoch,
    pub info: StationInfo,
}

/// History of station occupations within one session,
/// most recent interval first.
#[derive(Debug, Default)]
pub struct StationList {
    nodes: Vec<StationNode>,
}

impl StationList {
    /// Tracks one observation epoch: opens a new interval when the
    /// station id changed, extends the current one otherwise.
    pub fn update(&mut self, staid: u32, time: Epoch) {
        if let Some(head) = self.nodes.first_mut() {
            if head.staid == staid {
                head.te = time;
                return;
            }
        }

        self.nodes.insert(
            0,
            StationNode {
                staid,
                ts: time,
                te: time,
                info: StationInfo::default(),
            },
        );
    }

    /// Stores a station snapshot into the current interval, when the
    /// snapshot belongs to it. Last writer wins.
    pub fn update_info(&mut self, staid: u32, info: &StationInfo) {
        if let Some(head) = self.nodes.first_mut() {
            if head.staid == staid {
                head.info = info.clone();
            }
        }
    }

    pub fn head(&self) -> Option<&StationNode> {
        self.nodes.first()
    }

    /// Interval used for header fields: the last interval already over
    /// at the session start, or the most recent one.
    pub fn select(&self, ts: Option<Epoch>) -> Option<&StationNode> {
        let Some(ts) = ts else {
            return self.head();
        };

        // most-recent-first: the first match is the latest closed interval
        self.nodes
            .iter()
            .find(|node| node.te <= ts)
            .or_else(|| self.head())
    }

    /// Finds the most recent interval of a given station id.
    pub fn find(&self, staid: u32) -> Option<&StationNode> {
        self.nodes.iter().find(|node| node.staid == staid)
    }

    /// Intervals in chronological order (oldest first).
    pub fn chronological(&self) -> impl Iterator<Item = &StationNode> {
        self.nodes.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    fn t(s: &str) -> Epoch {
        Epoch::from_str(s).unwrap()
    }

    #[test]
    fn transitions_open_new_intervals() {
        let mut list = StationList::default();

        list.update(1, t("2020-01-01T00:00:00 GPST"));
        list.update(1, t("2020-01-01T00:00:30 GPST"));
        list.update(2, t("2020-01-01T00:01:00 GPST"));
        list.update(1, t("2020-01-01T00:01:30 GPST"));

        assert_eq!(list.len(), 3);
        assert_eq!(list.head().unwrap().staid, 1);

        let ids: Vec<u32> = list.chronological().map(|node| node.staid).collect();
        assert_eq!(ids, vec![1, 2, 1]);

        let first = list.chronological().next().unwrap();
        assert_eq!(first.ts, t("2020-01-01T00:00:00 GPST"));
        assert_eq!(first.te, t("2020-01-01T00:00:30 GPST"));
    }

    #[test]
    fn info_only_lands_on_matching_head() {
        let mut list = StationList::default();
        list.update(7, t("2020-01-01T00:00:00 GPST"));

        let mut info = StationInfo::default();
        info.marker_name = "SITE".to_string();

        list.update_info(8, &info);
        assert!(list.head().unwrap().info.marker_name.is_empty());

        list.update_info(7, &info);
        assert_eq!(list.head().unwrap().info.marker_name, "SITE");
    }

    #[test]
    fn selection_prefers_closed_intervals() {
        let mut list = StationList::default();
        list.update(1, t("2020-01-01T00:00:00 GPST"));
        list.update(1, t("2020-01-01T00:30:00 GPST"));
        list.update(2, t("2020-01-01T01:00:00 GPST"));
        list.update(2, t("2020-01-01T02:00:00 GPST"));

        // interval of station 1 is over by 00:45
        let node = list.select(Some(t("2020-01-01T00:45:00 GPST"))).unwrap();
        assert_eq!(node.staid, 1);

        // nothing closed yet: fall back to the head
        let node = list.select(Some(t("2020-01-01T00:10:00 GPST"))).unwrap();
        assert_eq!(node.staid, 2);

        let node = list.select(None).unwrap();
        assert_eq!(node.staid, 2);
    }
}
