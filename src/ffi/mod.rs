//! FFI bindings for the NBIS bozorth3 matcher
//!
//! libfprint exports the two bozorth3 entry points it uses internally for
//! print matching. Calling them directly yields the raw match score that
//! libfprint's public API reduces to a boolean.
//!
//! The entry points are only declared when the `nbis` feature links
//! libfprint (see build.rs). The `XytStruct` layout is always available so
//! sample conversion can be exercised without the native library.

#![allow(non_camel_case_types, dead_code)]

use crate::template::{MinutiaeSet, MAX_MINUTIAE};
use std::os::raw::c_int;

/// Mirror of `struct xyt_struct` from nbis/bozorth.h
#[repr(C)]
#[derive(Clone)]
pub struct XytStruct {
    pub nrows: c_int,
    pub xcol: [c_int; MAX_MINUTIAE],
    pub ycol: [c_int; MAX_MINUTIAE],
    pub thetacol: [c_int; MAX_MINUTIAE],
}

impl XytStruct {
    /// Lay out a sample for bozorth3 (extra points are already truncated)
    pub fn from_set(set: &MinutiaeSet) -> Box<Self> {
        let mut xyt = Box::new(Self {
            nrows: 0,
            xcol: [0; MAX_MINUTIAE],
            ycol: [0; MAX_MINUTIAE],
            thetacol: [0; MAX_MINUTIAE],
        });

        for (i, m) in set.points().iter().take(MAX_MINUTIAE).enumerate() {
            xyt.xcol[i] = m.x;
            xyt.ycol[i] = m.y;
            xyt.thetacol[i] = m.theta;
            xyt.nrows += 1;
        }
        xyt
    }
}

impl Drop for XytStruct {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.xcol.zeroize();
        self.ycol.zeroize();
        self.thetacol.zeroize();
    }
}

// Link native library when the NBIS matcher is enabled
#[cfg(feature = "nbis")]
#[link(name = "fprint-2")]
extern "C" {
    /// Load `pstruct` as the current probe; returns its prepared length
    ///
    /// bozorth3 keeps the prepared probe in process-global state.
    pub fn bozorth_probe_init(pstruct: *mut XytStruct) -> c_int;

    /// Score the current probe against one gallery sample
    pub fn bozorth_to_gallery(
        probe_len: c_int,
        pstruct: *mut XytStruct,
        gstruct: *mut XytStruct,
    ) -> c_int;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{AlgorithmFamily, Minutia};

    #[test]
    fn test_layout_matches_c_struct() {
        assert_eq!(
            std::mem::size_of::<XytStruct>(),
            std::mem::size_of::<c_int>() * (1 + 3 * MAX_MINUTIAE)
        );
    }

    #[test]
    fn test_from_set_fills_columns() {
        let set = MinutiaeSet::new(
            AlgorithmFamily::NbisXyt,
            vec![Minutia::new(1, 2, 3), Minutia::new(4, 5, 6)],
        );
        let xyt = XytStruct::from_set(&set);
        assert_eq!(xyt.nrows, 2);
        assert_eq!(&xyt.xcol[..2], &[1, 4]);
        assert_eq!(&xyt.ycol[..2], &[2, 5]);
        assert_eq!(&xyt.thetacol[..2], &[3, 6]);
        assert_eq!(xyt.xcol[2], 0);
    }
}
