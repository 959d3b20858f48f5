// Symmetric eigen-decomposition via cyclic Jacobi rotations. Dimension is
// channels x samples of the snapshotted waveforms, so the matrix is dense,
// symmetric and small enough (low hundreds) for Jacobi to be practical.

/// Dense square matrix in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    pub fn n(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] = value;
    }

    fn frobenius_norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    fn max_off_diagonal(&self) -> f64 {
        let mut max = 0.0f64;
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                max = max.max(self.get(i, j).abs());
            }
        }
        max
    }

    /// Eigenvalues and eigenvectors of a symmetric matrix, eigenvalues in
    /// descending order. Cyclic sweeps over every off-diagonal pair; for a
    /// symmetric input this converges well before `max_sweeps`, and after the
    /// sweep budget the accumulated rotation product is returned as-is.
    pub fn eigen_symmetric(&self, max_sweeps: usize, tol: f64) -> EigenDecomposition {
        debug_assert_eq!(self.data.len(), self.n * self.n);
        let n = self.n;
        let mut a = self.clone();
        let mut v = SquareMatrix::identity(n);

        let scale = a.frobenius_norm();
        let threshold = if scale > 0.0 { tol * scale } else { tol };

        for _sweep in 0..max_sweeps {
            if a.max_off_diagonal() <= threshold {
                break;
            }
            for p in 0..n.saturating_sub(1) {
                for q in (p + 1)..n {
                    let apq = a.get(p, q);
                    if apq.abs() <= threshold * 1e-3 {
                        continue;
                    }
                    let (c, s) = jacobi_rotation(a.get(p, p), a.get(q, q), apq);
                    apply_rotation(&mut a, p, q, c, s);
                    rotate_vectors(&mut v, p, q, c, s);
                }
            }
        }

        let mut values: Vec<f64> = (0..n).map(|i| a.get(i, i)).collect();
        sort_descending(&mut values, &mut v);
        EigenDecomposition {
            values,
            vectors: v,
        }
    }
}

/// Eigenvectors stored as columns, matching the eigenvalue order.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    pub values: Vec<f64>,
    vectors: SquareMatrix,
}

impl EigenDecomposition {
    /// The k-th eigenvector as an owned column.
    pub fn vector(&self, k: usize) -> Vec<f64> {
        (0..self.vectors.n()).map(|i| self.vectors.get(i, k)).collect()
    }
}

// Rotation annihilating a[p][q], from the symmetric Schur decomposition.
fn jacobi_rotation(app: f64, aqq: f64, apq: f64) -> (f64, f64) {
    if app == aqq {
        let c = std::f64::consts::FRAC_1_SQRT_2;
        return (c, c);
    }
    let tau = (aqq - app) / (2.0 * apq);
    let t = if tau >= 0.0 {
        1.0 / (tau + (1.0 + tau * tau).sqrt())
    } else {
        -1.0 / (-tau + (1.0 + tau * tau).sqrt())
    };
    let c = 1.0 / (1.0 + t * t).sqrt();
    (c, t * c)
}

fn apply_rotation(a: &mut SquareMatrix, p: usize, q: usize, c: f64, s: f64) {
    let app = a.get(p, p);
    let aqq = a.get(q, q);
    let apq = a.get(p, q);

    a.set(p, p, c * c * app - 2.0 * c * s * apq + s * s * aqq);
    a.set(q, q, s * s * app + 2.0 * c * s * apq + c * c * aqq);
    a.set(p, q, 0.0);
    a.set(q, p, 0.0);

    for k in 0..a.n() {
        if k != p && k != q {
            let akp = a.get(k, p);
            let akq = a.get(k, q);
            let new_kp = c * akp - s * akq;
            let new_kq = s * akp + c * akq;
            a.set(k, p, new_kp);
            a.set(p, k, new_kp);
            a.set(k, q, new_kq);
            a.set(q, k, new_kq);
        }
    }
}

fn rotate_vectors(v: &mut SquareMatrix, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..v.n() {
        let vkp = v.get(k, p);
        let vkq = v.get(k, q);
        v.set(k, p, c * vkp - s * vkq);
        v.set(k, q, s * vkp + c * vkq);
    }
}

// Selection sort is fine at these dimensions; swaps eigenvector columns along.
fn sort_descending(values: &mut [f64], vectors: &mut SquareMatrix) {
    let n = values.len();
    for i in 0..n {
        let mut max_idx = i;
        for j in (i + 1)..n {
            if values[j] > values[max_idx] {
                max_idx = j;
            }
        }
        if max_idx != i {
            values.swap(i, max_idx);
            for k in 0..n {
                let tmp = vectors.get(k, i);
                vectors.set(k, i, vectors.get(k, max_idx));
                vectors.set(k, max_idx, tmp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eigen_of_identity() {
        let eye = SquareMatrix::identity(3);
        let e = eye.eigen_symmetric(30, 1e-12);
        for i in 0..3 {
            assert!((e.values[i] - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn eigen_of_diagonal_sorts_descending() {
        let mut a = SquareMatrix::zeros(4);
        a.set(0, 0, 1.0);
        a.set(1, 1, 4.0);
        a.set(2, 2, 2.0);
        a.set(3, 3, 3.0);

        let e = a.eigen_symmetric(30, 1e-12);
        assert!((e.values[0] - 4.0).abs() < 1e-9);
        assert!((e.values[1] - 3.0).abs() < 1e-9);
        assert!((e.values[2] - 2.0).abs() < 1e-9);
        assert!((e.values[3] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn eigen_2x2_known_answer() {
        // [3 1; 1 3] has eigenvalues 4 and 2
        let mut a = SquareMatrix::zeros(2);
        a.set(0, 0, 3.0);
        a.set(0, 1, 1.0);
        a.set(1, 0, 1.0);
        a.set(1, 1, 3.0);

        let e = a.eigen_symmetric(30, 1e-12);
        assert!((e.values[0] - 4.0).abs() < 1e-9);
        assert!((e.values[1] - 2.0).abs() < 1e-9);

        // A v = lambda v for the leading eigenvector
        let v0 = e.vector(0);
        let av = [
            a.get(0, 0) * v0[0] + a.get(0, 1) * v0[1],
            a.get(1, 0) * v0[0] + a.get(1, 1) * v0[1],
        ];
        assert!((av[0] - e.values[0] * v0[0]).abs() < 1e-8);
        assert!((av[1] - e.values[0] * v0[1]).abs() < 1e-8);
    }

    #[test]
    fn eigenvectors_are_orthonormal() {
        let mut a = SquareMatrix::zeros(3);
        for i in 0..3 {
            for j in 0..3 {
                a.set(i, j, if i == j { 4.0 } else { 1.0 });
            }
        }
        let e = a.eigen_symmetric(30, 1e-12);
        for i in 0..3 {
            let vi = e.vector(i);
            let norm: f64 = vi.iter().map(|v| v * v).sum();
            assert!((norm - 1.0).abs() < 1e-8);
            for j in (i + 1)..3 {
                let vj = e.vector(j);
                let dot: f64 = vi.iter().zip(&vj).map(|(a, b)| a * b).sum();
                assert!(dot.abs() < 1e-8);
            }
        }
    }

    #[test]
    fn zero_matrix_does_not_blow_up() {
        let a = SquareMatrix::zeros(3);
        let e = a.eigen_symmetric(30, 1e-12);
        assert_eq!(e.values, vec![0.0, 0.0, 0.0]);
    }
}
