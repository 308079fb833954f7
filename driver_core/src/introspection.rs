//! Live variables exposed for debugging tools, grouped under named roots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use lazy_static::lazy_static;

use crate::host_interfaces::XrtPose;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(usize);

#[derive(Debug, Clone)]
pub enum TrackedVar {
    Pose(Arc<Mutex<XrtPose>>),
}

#[derive(Debug)]
pub struct VarRoot {
    pub name: String,
    pub vars: Vec<(String, TrackedVar)>,
}

lazy_static! {
    static ref ROOTS: DashMap<RootId, VarRoot> = DashMap::new();
}

static NEXT_ROOT: AtomicUsize = AtomicUsize::new(0);

pub fn add_root(name: &str) -> RootId {
    let id = RootId(NEXT_ROOT.fetch_add(1, Ordering::Relaxed));
    ROOTS.insert(
        id,
        VarRoot {
            name: name.to_owned(),
            vars: Vec::new(),
        },
    );
    id
}

pub fn add_pose(root: RootId, pose: &Arc<Mutex<XrtPose>>, label: &str) {
    if let Some(mut root) = ROOTS.get_mut(&root) {
        root.vars
            .push((label.to_owned(), TrackedVar::Pose(pose.clone())));
    }
}

pub fn remove_root(root: RootId) -> bool {
    ROOTS.remove(&root).is_some()
}

#[cfg(test)]
pub(crate) fn contains(root: RootId) -> bool {
    ROOTS.contains_key(&root)
}

/// Current value of every pose registered under `root`.
#[cfg(test)]
pub(crate) fn poses(root: RootId) -> Vec<(String, XrtPose)> {
    use std::sync::PoisonError;

    ROOTS
        .get(&root)
        .map(|root| {
            root.vars
                .iter()
                .map(|(label, var)| match var {
                    TrackedVar::Pose(pose) => {
                        (label.clone(), *pose.lock().unwrap_or_else(PoisonError::into_inner))
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_come_and_go() {
        let pose = Arc::new(Mutex::new(XrtPose::IDENTITY));
        let root = add_root("ILLIXR");
        add_pose(root, &pose, "pose");

        assert!(contains(root));
        assert_eq!(poses(root), vec![("pose".to_owned(), XrtPose::IDENTITY)]);

        pose.lock().unwrap().position.x = 2.0;
        assert_eq!(poses(root)[0].1.position.x, 2.0);

        assert!(remove_root(root));
        assert!(!contains(root));
        assert!(!remove_root(root));
        assert!(poses(root).is_empty());
    }
}
