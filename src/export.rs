//! Writing results: PNG previews of maps, CSV spectra, stack files.

use image::{GrayImage, Luma};
use std::fmt::Write as _;
use std::path::Path;

use crate::data::{EnergyAxis, ImageMap, SpectrumStack};
use crate::error::Result;
use crate::pipeline::pca::PcaResult;

/// Map scaled linearly from its finite min..max to 0..255. Non-finite
/// pixels and flat maps render black.
pub fn map_to_gray(map: &ImageMap) -> GrayImage {
    let (lo, hi) = map.min_max().unwrap_or((0.0, 0.0));
    let span = hi - lo;
    GrayImage::from_fn(map.width as u32, map.height as u32, |x, y| {
        let v = map.get(x as usize, y as usize);
        let level = if v.is_finite() && span > 0.0 {
            ((v - lo) / span * 255.0).round().clamp(0.0, 255.0) as u8
        } else {
            0
        };
        Luma([level])
    })
}

pub fn write_map_png(map: &ImageMap, path: &Path) -> Result<()> {
    map_to_gray(map).save(path)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Single-channel stack file holding `map`, calibrated at `axis`.
pub fn write_map_stack(map: &ImageMap, axis: &EnergyAxis, path: &Path) -> Result<()> {
    SpectrumStack::from_maps(std::slice::from_ref(map), axis.clone())?.save(path)
}

/// CSV with an energy column followed by one column per named series.
/// Series shorter than the axis leave their cells empty.
pub fn spectra_csv(axis: &EnergyAxis, n: usize, columns: &[(&str, &[f64])]) -> String {
    let mut out = String::new();
    out.push_str(&format!("energy_{}", axis.unit));
    for (name, _) in columns {
        out.push(',');
        out.push_str(name);
    }
    out.push('\n');

    for i in 0..n {
        let _ = write!(out, "{}", axis.energy_at(i));
        for (_, values) in columns {
            out.push(',');
            if let Some(v) = values.get(i) {
                let _ = write!(out, "{}", v);
            }
        }
        out.push('\n');
    }
    out
}

/// Singular values with their scree and explained-variance columns.
pub fn scree_csv(result: &PcaResult) -> String {
    let mut out = String::from("component,singular_value,scree,explained_variance\n");
    let scree = result.scree();
    let ev = result.explained_variance();
    for (k, s) in result.singular_values.iter().enumerate() {
        let _ = writeln!(out, "{},{},{},{}", k, s, scree[k], ev[k]);
    }
    out
}

/// The first `n` component spectra over the PCA window.
pub fn components_csv(result: &PcaResult, n: usize) -> String {
    let n = n.min(result.n_components());
    let names: Vec<String> = (0..n).map(|k| format!("pc{}", k)).collect();
    let columns: Vec<(&str, &[f64])> = names
        .iter()
        .zip(&result.spectra)
        .map(|(name, s)| (name.as_str(), s.as_slice()))
        .collect();
    spectra_csv(&result.axis, result.samples(), &columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_scaling() {
        let map = ImageMap::new(3, 1, vec![-1.0, 0.0, 1.0]);
        let img = map_to_gray(&map);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 128);
        assert_eq!(img.get_pixel(2, 0)[0], 255);
    }

    #[test]
    fn test_flat_map_is_black() {
        let img = map_to_gray(&ImageMap::new(2, 2, vec![4.0; 4]));
        assert!(img.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_csv_layout() {
        let axis = EnergyAxis::new(10.0, 0.5, "eV");
        let a = [1.0, 2.0, 3.0];
        let b = [7.0, 8.0];
        let csv = spectra_csv(&axis, 3, &[("data", &a[..]), ("fit", &b[..])]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "energy_eV,data,fit");
        assert_eq!(lines[1], "10,1,7");
        assert_eq!(lines[3], "11,3,");
    }
}
