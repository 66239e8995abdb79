use std::fmt::Display;
use std::path::Path;

use oxyroot::{RootFile, Slice};

use super::error::DelphesError;

/// Name of the tree Delphes writes its output to
pub const DELPHES_TREE: &str = "Delphes";

// Branch definitions: https://cp3.irmp.ucl.ac.be/projects/delphes/wiki/WorkBook/RootTreeDescription
pub const TRACK_PID: &str = "Track.PID";
pub const TRACK_PT: &str = "Track.PT";
pub const TRACK_P: &str = "Track.P";
pub const TRACK_CTG_THETA: &str = "Track.CtgTheta";
pub const TRACK_PHI: &str = "Track.Phi";
pub const TRACK_X_OUTER: &str = "Track.XOuter";
pub const TRACK_Y_OUTER: &str = "Track.YOuter";

/// The Delphes track fields needed to build a PixelAV track list.
///
/// Momenta in GeV, positions in mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelphesTrack {
    pub pid: i32,
    pub pt: f32,
    pub p: f32,
    pub ctg_theta: f32,
    pub phi: f32,
    pub x_outer: f32,
    pub y_outer: f32,
}

/// Track branches flattened over events, one entry per track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackColumns {
    pub n_events: usize,
    pub pid: Vec<i32>,
    pub pt: Vec<f32>,
    pub p: Vec<f32>,
    pub ctg_theta: Vec<f32>,
    pub phi: Vec<f32>,
    pub x_outer: Vec<f32>,
    pub y_outer: Vec<f32>,
}

impl TrackColumns {
    /// Zip the columns into typed records. Every column must have one entry per track.
    pub fn into_tracks(self) -> Result<Vec<DelphesTrack>, DelphesError> {
        let n_tracks = self.pid.len();
        let lengths = [
            (TRACK_PT, self.pt.len()),
            (TRACK_P, self.p.len()),
            (TRACK_CTG_THETA, self.ctg_theta.len()),
            (TRACK_PHI, self.phi.len()),
            (TRACK_X_OUTER, self.x_outer.len()),
            (TRACK_Y_OUTER, self.y_outer.len()),
        ];
        for (name, len) in lengths {
            if len != n_tracks {
                return Err(DelphesError::BranchLengthMismatch(
                    TRACK_PID.to_string(),
                    n_tracks,
                    name.to_string(),
                    len,
                ));
            }
        }

        Ok((0..n_tracks)
            .map(|i| DelphesTrack {
                pid: self.pid[i],
                pt: self.pt[i],
                p: self.p[i],
                ctg_theta: self.ctg_theta[i],
                phi: self.phi[i],
                x_outer: self.x_outer[i],
                y_outer: self.y_outer[i],
            })
            .collect())
    }
}

fn branch_error(name: &str, e: impl Display) -> DelphesError {
    DelphesError::RootError(format!("{name}: {e}"))
}

// Read a per-event array branch, failing with the branch name if it is absent. Delphes writes
// split C arrays (`T[]`); files written from std::vector branches are read too.
macro_rules! read_branch {
    ($tree:expr, $name:expr, $ty:ty) => {{
        let branch = $tree
            .branch($name)
            .ok_or_else(|| DelphesError::MissingBranch($name.to_string()))?;
        let per_event: Vec<Vec<$ty>> = if branch.item_type_name().starts_with("vector<") {
            branch
                .as_iter::<Vec<$ty>>()
                .map_err(|e| branch_error($name, e))?
                .collect()
        } else {
            branch
                .as_iter::<Slice<$ty>>()
                .map_err(|e| branch_error($name, e))?
                .map(Slice::into_vec)
                .collect()
        };
        per_event
    }};
}

/// Load the track branches of a Delphes output file
pub fn read_track_columns(path: &Path) -> Result<TrackColumns, DelphesError> {
    if !path.exists() {
        return Err(DelphesError::BadFilePath(path.to_path_buf()));
    }
    let tree = RootFile::open(path)
        .map_err(|e| DelphesError::RootError(e.to_string()))?
        .get_tree(DELPHES_TREE)
        .map_err(|e| DelphesError::RootError(e.to_string()))?;

    let pid = read_branch!(tree, TRACK_PID, i32);
    let n_events = pid.len();
    log::info!("Read {} events from {}", n_events, path.display());

    Ok(TrackColumns {
        n_events,
        pid: pid.into_iter().flatten().collect(),
        pt: read_branch!(tree, TRACK_PT, f32).into_iter().flatten().collect(),
        p: read_branch!(tree, TRACK_P, f32).into_iter().flatten().collect(),
        ctg_theta: read_branch!(tree, TRACK_CTG_THETA, f32)
            .into_iter()
            .flatten()
            .collect(),
        phi: read_branch!(tree, TRACK_PHI, f32).into_iter().flatten().collect(),
        x_outer: read_branch!(tree, TRACK_X_OUTER, f32)
            .into_iter()
            .flatten()
            .collect(),
        y_outer: read_branch!(tree, TRACK_Y_OUTER, f32)
            .into_iter()
            .flatten()
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> TrackColumns {
        TrackColumns {
            n_events: 2,
            pid: vec![211, -13, -211],
            pt: vec![1.0, 2.0, 3.0],
            p: vec![1.5, 2.5, 3.5],
            ctg_theta: vec![0.1, 0.2, 0.3],
            phi: vec![0.5, 1.0, -1.0],
            x_outer: vec![10.0, 20.0, 30.0],
            y_outer: vec![-10.0, -20.0, -30.0],
        }
    }

    #[test]
    fn test_into_tracks() {
        let tracks = columns().into_tracks().unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[2].pid, -211);
        assert_eq!(tracks[2].x_outer, 30.0);
        assert_eq!(tracks[1].ctg_theta, 0.2);
    }

    #[test]
    fn test_length_mismatch() {
        let mut cols = columns();
        cols.y_outer.pop();
        match cols.into_tracks() {
            Err(DelphesError::BranchLengthMismatch(a, 3, b, 2)) => {
                assert_eq!(a, TRACK_PID);
                assert_eq!(b, TRACK_Y_OUTER);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    // Two events: [pi+, mu+] and [pi-]
    fn write_delphes_file(path: &Path, skip: Option<&str>) {
        let mut file = RootFile::create(path).unwrap();
        let mut tree = oxyroot::WriterTree::new(DELPHES_TREE);
        if skip != Some(TRACK_PID) {
            tree.new_branch(TRACK_PID, vec![vec![211, -13], vec![-211]].into_iter());
        }
        let float_branches: [(&str, [Vec<f32>; 2]); 6] = [
            (TRACK_PT, [vec![1.0, 2.0], vec![3.0]]),
            (TRACK_P, [vec![1.5, 2.5], vec![3.5]]),
            (TRACK_CTG_THETA, [vec![0.1, 0.2], vec![0.3]]),
            (TRACK_PHI, [vec![0.5, 1.0], vec![-1.0]]),
            (TRACK_X_OUTER, [vec![10.0, 20.0], vec![30.0]]),
            (TRACK_Y_OUTER, [vec![-10.0, -20.0], vec![-30.0]]),
        ];
        for (name, per_event) in float_branches {
            if skip != Some(name) {
                tree.new_branch(name, per_event.into_iter());
            }
        }
        tree.write(&mut file).unwrap();
        file.close().unwrap();
    }

    #[test]
    fn test_read_track_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delphes.root");
        write_delphes_file(&path, None);

        let columns = read_track_columns(&path).unwrap();
        assert_eq!(columns.n_events, 2);
        assert_eq!(columns.pid, vec![211, -13, -211]);
        assert_eq!(columns.y_outer, vec![-10.0, -20.0, -30.0]);

        let tracks = columns.into_tracks().unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[2].pid, -211);
        assert_eq!(tracks[2].p, 3.5);
        assert_eq!(tracks[1].phi, 1.0);
    }

    #[test]
    fn test_missing_branch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delphes.root");
        write_delphes_file(&path, Some(TRACK_CTG_THETA));

        match read_track_columns(&path) {
            Err(DelphesError::MissingBranch(name)) => assert_eq!(name, TRACK_CTG_THETA),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let result = read_track_columns(Path::new("/no/such/delphes.root"));
        assert!(matches!(result, Err(DelphesError::BadFilePath(_))));
    }
}
