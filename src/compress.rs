use crate::Result;
use crate::error::CompressionError;
use crate::imagewrapper::{Image, PixelArray};
use crate::jacobi;
use faer_core::{
    Mat, MatRef, Parallelism,
    dyn_stack::{GlobalPodBuffer, PodStack},
};
use faer_svd::*;
use rayon::prelude::*;
use std::array;

const RELATIVE_TOLERANCE: f64 = 1e-4;

/// Reduced SVD of one channel: `mat = u * diag(s) * v^T`, with `u` of size
/// `m x min(m, n)`, `v` of size `n x min(m, n)` and `s` in descending order.
/// Triplets past the rank of the non-zero part of the channel are all zero.
pub struct ChannelSvd {
    u: Mat<f32>,
    s: Vec<f32>,
    v: Mat<f32>,
}

impl ChannelSvd {
    pub fn compute(mat: MatRef<'_, f32>) -> Result<Self> {
        let m = mat.nrows();
        let n = mat.ncols();
        let size = m.min(n);

        if let Some((i, j)) = first_non_finite(mat) {
            return Err(CompressionError::DecompositionFailure(format!(
                "entry ({}, {}) is not finite",
                i, j
            )));
        }

        // all-zero rows and columns only add zero rows to the factors
        let rows: Vec<usize> = (0..m)
            .filter(|&i| (0..n).any(|j| mat.read(i, j) != 0.0))
            .collect();
        let cols: Vec<usize> = (0..n)
            .filter(|&j| (0..m).any(|i| mat.read(i, j) != 0.0))
            .collect();
        let compact = Mat::from_fn(rows.len(), cols.len(), |i, j| mat.read(rows[i], cols[j]));

        let (u, s, v) = decompose(compact.as_ref())?;

        let mut order: Vec<usize> = (0..s.len()).collect();
        order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));

        let mut row_slot = vec![None; m];
        for (r, &i) in rows.iter().enumerate() {
            row_slot[i] = Some(r);
        }
        let mut col_slot = vec![None; n];
        for (c, &j) in cols.iter().enumerate() {
            col_slot[j] = Some(c);
        }

        let kept = s.len();
        let mut singular_values: Vec<f32> = order.iter().map(|&l| s[l]).collect();
        singular_values.resize(size, 0.0);

        Ok(Self {
            u: Mat::from_fn(m, size, |i, l| match row_slot[i] {
                Some(r) if l < kept => u.read(r, order[l]),
                _ => 0.0,
            }),
            s: singular_values,
            v: Mat::from_fn(n, size, |j, l| match col_slot[j] {
                Some(c) if l < kept => v.read(c, order[l]),
                _ => 0.0,
            }),
        })
    }

    pub fn singular_values(&self) -> &[f32] {
        &self.s
    }

    pub fn u(&self) -> MatRef<'_, f32> {
        self.u.as_ref()
    }

    pub fn v(&self) -> MatRef<'_, f32> {
        self.v.as_ref()
    }

    /// `u_k * diag(s_k) * v_k^T` over the leading `min(rank, s.len())` triplets.
    pub fn reconstruct(&self, rank: usize) -> Mat<f32> {
        let k = rank.min(self.s.len());
        let m = self.u.nrows();
        let n = self.v.nrows();

        let us = Mat::from_fn(m, k, |i, l| self.u.read(i, l) * self.s[l]);
        Mat::from_fn(m, n, |i, j| {
            (0..k)
                .map(|l| f64::from(us.read(i, l)) * f64::from(self.v.read(j, l)))
                .sum::<f64>() as f32
        })
    }

    /// Frobenius error of the rank-`rank` reconstruction, from the discarded singular values.
    pub fn truncation_error(&self, rank: usize) -> f32 {
        let k = rank.min(self.s.len());
        self.s[k..]
            .iter()
            .map(|&sigma| f64::from(sigma).powi(2))
            .sum::<f64>()
            .sqrt() as f32
    }
}

/// Thin SVD of `mat`, checked against `mat` itself. Falls back to one-sided
/// Jacobi when the faer factors do not reproduce the input.
fn decompose(mat: MatRef<'_, f32>) -> Result<(Mat<f32>, Vec<f32>, Mat<f32>)> {
    let m = mat.nrows();
    let n = mat.ncols();
    if m.min(n) == 0 {
        return Ok((Mat::zeros(m, 0), Vec::new(), Mat::zeros(n, 0)));
    }

    let (u, s, v) = faer_thin_svd(mat)?;
    if reproduces(mat, u.as_ref(), &s, v.as_ref()) {
        return Ok((u, s, v));
    }
    log::warn!(
        "faer SVD does not reproduce the {}x{} channel, retrying with Jacobi",
        m,
        n
    );

    let (u, s, v) = jacobi::thin_svd(mat)?;
    if reproduces(mat, u.as_ref(), &s, v.as_ref()) {
        return Ok((u, s, v));
    }
    Err(CompressionError::DecompositionFailure(format!(
        "no decomposition reproduces the {}x{} channel",
        m, n
    )))
}

fn faer_thin_svd(mat: MatRef<'_, f32>) -> Result<(Mat<f32>, Vec<f32>, Mat<f32>)> {
    let m = mat.nrows();
    let n = mat.ncols();
    let size = m.min(n);

    let mut s = Mat::<f32>::zeros(size, 1);
    let mut u = Mat::<f32>::zeros(m, size);
    let mut v = Mat::<f32>::zeros(n, size);

    let parallelism = Parallelism::None;
    let params = SvdParams::default();

    let stack_req = compute_svd_req::<f32>(
        m,
        n,
        ComputeVectors::Thin,
        ComputeVectors::Thin,
        parallelism,
        params,
    )
    .map_err(|_| {
        CompressionError::DecompositionFailure(format!(
            "workspace for a {}x{} matrix overflows",
            m, n
        ))
    })?;

    let mut mem = GlobalPodBuffer::new(stack_req);
    let stack = PodStack::new(&mut mem);

    compute_svd(
        mat,
        s.as_mut(),
        Some(u.as_mut()),
        Some(v.as_mut()),
        parallelism,
        stack,
        params,
    );

    let s = (0..size).map(|l| s.read(l, 0)).collect();
    Ok((u, s, v))
}

/// Whether `u * diag(s) * v^T` matches `mat` to a relative Frobenius tolerance.
fn reproduces(mat: MatRef<'_, f32>, u: MatRef<'_, f32>, s: &[f32], v: MatRef<'_, f32>) -> bool {
    if s.iter().any(|sigma| !sigma.is_finite() || *sigma < 0.0) {
        return false;
    }
    let mut residual = 0.0f64;
    for i in 0..mat.nrows() {
        for j in 0..mat.ncols() {
            let approx: f64 = (0..s.len())
                .map(|l| f64::from(u.read(i, l)) * f64::from(s[l]) * f64::from(v.read(j, l)))
                .sum();
            residual += (approx - f64::from(mat.read(i, j))).powi(2);
        }
    }
    let norm = f64::from(frobenius_norm(mat));
    residual.sqrt() <= RELATIVE_TOLERANCE * norm.max(f64::MIN_POSITIVE)
}

fn first_non_finite(mat: MatRef<'_, f32>) -> Option<(usize, usize)> {
    (0..mat.nrows())
        .flat_map(|i| (0..mat.ncols()).map(move |j| (i, j)))
        .find(|&(i, j)| !mat.read(i, j).is_finite())
}

/// Rejects a zero rank and clamps one larger than `min(height, width)`.
pub fn effective_rank(rank: usize, height: usize, width: usize) -> Result<usize> {
    if rank == 0 {
        return Err(CompressionError::InvalidArgument(
            "rank must be at least 1".to_owned(),
        ));
    }
    let max_rank = height.min(width);
    if max_rank > 0 && rank > max_rank {
        log::warn!(
            "rank {} exceeds min(height, width) = {}, clamping to {}",
            rank,
            max_rank,
            max_rank
        );
        return Ok(max_rank);
    }
    Ok(rank)
}

pub fn parse_rank(text: &str) -> Result<usize> {
    let rank: i64 = text.trim().parse().map_err(|_| {
        CompressionError::InvalidArgument(format!("rank must be an integer, got '{}'", text))
    })?;
    if rank <= 0 {
        return Err(CompressionError::InvalidArgument(format!(
            "rank must be positive, got {}",
            rank
        )));
    }
    usize::try_from(rank)
        .map_err(|_| CompressionError::InvalidArgument(format!("rank {} is too large", rank)))
}

/// Best rank-`rank` approximation of `mat` in the Frobenius norm.
pub fn compress_channel(mat: MatRef<'_, f32>, rank: usize) -> Result<Mat<f32>> {
    let rank = effective_rank(rank, mat.nrows(), mat.ncols())?;
    approximate(mat, rank)
}

fn approximate(mat: MatRef<'_, f32>, rank: usize) -> Result<Mat<f32>> {
    let svd = ChannelSvd::compute(mat)?;
    log::debug!(
        "{}x{} channel: keeping {} of {} singular values",
        mat.nrows(),
        mat.ncols(),
        rank.min(svd.singular_values().len()),
        svd.singular_values().len()
    );
    Ok(svd.reconstruct(rank))
}

pub trait Compressible: Sized {
    fn compress(&self, rank: usize) -> Result<Self>;
}

impl Compressible for Mat<f32> {
    fn compress(&self, rank: usize) -> Result<Self> {
        compress_channel(self.as_ref(), rank)
    }
}

impl Compressible for Image {
    fn compress(&self, rank: usize) -> Result<Self> {
        let rank = effective_rank(rank, self.height(), self.width())?;

        match self {
            Image::Grayscale(mat) => Ok(Image::Grayscale(approximate(mat.as_ref(), rank)?)),
            Image::Rgb(mats) => {
                let mut compressed: [Mat<f32>; 3] = array::from_fn(|_| Mat::new());
                compressed
                    .par_iter_mut()
                    .zip(mats.par_iter())
                    .try_for_each(|(dst, src)| -> Result<()> {
                        *dst = approximate(src.as_ref(), rank)?;
                        Ok(())
                    })?;
                Ok(Image::Rgb(compressed))
            }
        }
    }
}

/// Clamps every sample to [0, 255] and truncates it to `u8`.
pub fn quantize(image: &Image) -> PixelArray<u8> {
    let height = image.height();
    let width = image.width();
    let channels = image.channels();

    let shape = match image {
        Image::Grayscale(_) => vec![height, width],
        Image::Rgb(_) => vec![height, width, 3],
    };
    let mut data = Vec::with_capacity(height * width * channels.len());
    for i in 0..height {
        for j in 0..width {
            data.extend(channels.iter().map(|mat| mat.read(i, j).clamp(0.0, 255.0) as u8));
        }
    }
    PixelArray::from_parts(shape, data)
}

/// Compresses every channel to `rank` and quantizes the result to 8 bits.
pub fn compress_image(image: &Image, rank: usize) -> Result<PixelArray<u8>> {
    Ok(quantize(&image.compress(rank)?))
}

pub fn frobenius_norm(mat: MatRef<'_, f32>) -> f32 {
    let mut sum = 0.0f64;
    for i in 0..mat.nrows() {
        for j in 0..mat.ncols() {
            sum += f64::from(mat.read(i, j)).powi(2);
        }
    }
    sum.sqrt() as f32
}

pub fn frobenius_distance(a: MatRef<'_, f32>, b: MatRef<'_, f32>) -> Result<f32> {
    if (a.nrows(), a.ncols()) != (b.nrows(), b.ncols()) {
        return Err(CompressionError::ShapeMismatch(format!(
            "{}x{} against {}x{}",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    let diff = Mat::from_fn(a.nrows(), a.ncols(), |i, j| a.read(i, j) - b.read(i, j));
    Ok(frobenius_norm(diff.as_ref()))
}

/// Fraction of the raw channel storage taken by the rank-`rank` factors.
pub fn storage_ratio(height: usize, width: usize, rank: usize) -> f64 {
    if height == 0 || width == 0 {
        return 0.0;
    }
    (rank * (height + width + 1)) as f64 / (height * width) as f64
}
