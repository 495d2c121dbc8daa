// Matrix / linear-algebra operations over `ndarray::Array2<f64>`.
//
// Decompositions are elimination-based; eigenvalues are supported for 2x2
// matrices (closed form) and symmetric matrices (Jacobi rotations).

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2};
use serde_json::{json, Value};

use crate::expr::format_sig;
use crate::tools::handlers::Handled;
use crate::tools::types::{matrix_arg, optional_number_list, required_str};

const RANK_TOLERANCE: f64 = 1e-10;

pub(crate) fn matrix_ops(args: &Value) -> Result<Handled> {
    let rows = matrix_arg(args, "matrix")?;
    let operation = required_str(args, "operation")?.trim().to_lowercase();
    let a = to_array(&rows)?;

    match operation.as_str() {
        "determinant" => {
            let det = determinant(&square(&a)?);
            Ok((
                format!("$\\det(A) = {}$", format_sig(det, 8)),
                Some(json!(det)),
            ))
        }
        "inverse" => {
            let inv = inverse(&square(&a)?)?;
            Ok((
                format!("$A^{{-1}} = {}$", to_latex(&inv)),
                Some(json!(rows_of(&inv))),
            ))
        }
        "transpose" => {
            let t = a.t().to_owned();
            Ok((
                format!("$A^T = {}$", to_latex(&t)),
                Some(json!(rows_of(&t))),
            ))
        }
        "trace" => {
            let trace: f64 = a.diag().sum();
            Ok((
                format!("$\\mathrm{{tr}}(A) = {}$", format_sig(trace, 8)),
                Some(json!(trace)),
            ))
        }
        "rank" => {
            let rank = rank(&a);
            Ok((format!("$\\mathrm{{rank}}(A) = {}$", rank), Some(json!(rank))))
        }
        "norm" => {
            let norm = a.iter().map(|v| v * v).sum::<f64>().sqrt();
            Ok((
                format!("$\\|A\\| = {}$", format_sig(norm, 8)),
                Some(json!(norm)),
            ))
        }
        "solve_linear" => {
            let rhs = optional_number_list(args, "rhs")
                .context("rhs vector required for solve_linear")?;
            let b = Array1::from_vec(rhs);
            let x = solve_linear(&square(&a)?, &b)?;
            let rendered = x
                .iter()
                .map(|v| format_sig(*v, 8))
                .collect::<Vec<_>>()
                .join(", ");
            Ok((
                format!("$x = ({})$", rendered),
                Some(json!(x.to_vec())),
            ))
        }
        "eigenvalues" => {
            let (display, raw) = eigenvalues(&square(&a)?)?;
            Ok((display, Some(raw)))
        }
        "rref" => {
            let (reduced, pivots) = rref(&a);
            let display = format!(
                "RREF:\n${}$\nPivot columns: {:?}",
                to_latex(&reduced),
                pivots
            );
            Ok((display, Some(json!({ "rref": rows_of(&reduced), "pivots": pivots }))))
        }
        other => bail!("unknown operation: {}", other),
    }
}

fn to_array(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    if rows.is_empty() {
        bail!("matrix must not be empty");
    }
    let width = rows[0].len();
    if width == 0 {
        bail!("matrix rows must not be empty");
    }
    if rows.iter().any(|row| row.len() != width) {
        bail!("matrix rows must all have the same length");
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat).context("invalid matrix shape")
}

fn square(a: &Array2<f64>) -> Result<Array2<f64>> {
    if a.nrows() != a.ncols() {
        bail!(
            "operation requires a square matrix, got {}x{}",
            a.nrows(),
            a.ncols()
        );
    }
    Ok(a.clone())
}

fn rows_of(a: &Array2<f64>) -> Vec<Vec<f64>> {
    a.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn to_latex(a: &Array2<f64>) -> String {
    let rows: Vec<String> = a
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|v| format_sig(*v, 8))
                .collect::<Vec<_>>()
                .join(" & ")
        })
        .collect();
    format!(
        "\\begin{{pmatrix}} {} \\end{{pmatrix}}",
        rows.join(" \\\\ ")
    )
}

/// Determinant via LU decomposition with partial pivoting.
fn determinant(a: &Array2<f64>) -> f64 {
    let n = a.nrows();
    let mut m = a.clone();
    let mut det = 1.0;

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if m[[row, col]].abs() > m[[pivot, col]].abs() {
                pivot = row;
            }
        }
        if m[[pivot, col]].abs() < 1e-300 {
            return 0.0;
        }
        if pivot != col {
            for k in 0..n {
                let tmp = m[[col, k]];
                m[[col, k]] = m[[pivot, k]];
                m[[pivot, k]] = tmp;
            }
            det = -det;
        }
        det *= m[[col, col]];
        for row in col + 1..n {
            let factor = m[[row, col]] / m[[col, col]];
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
        }
    }

    det
}

/// Inverse via Gauss-Jordan elimination on the augmented matrix.
fn inverse(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut m = a.clone();
    let mut inv = Array2::eye(n);

    for col in 0..n {
        let mut pivot = col;
        for row in col + 1..n {
            if m[[row, col]].abs() > m[[pivot, col]].abs() {
                pivot = row;
            }
        }
        if m[[pivot, col]].abs() < 1e-12 {
            bail!("matrix is singular");
        }
        if pivot != col {
            for k in 0..n {
                m.swap([col, k], [pivot, k]);
                inv.swap([col, k], [pivot, k]);
            }
        }
        let scale = m[[col, col]];
        for k in 0..n {
            m[[col, k]] /= scale;
            inv[[col, k]] /= scale;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                m[[row, k]] -= factor * m[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }

    Ok(inv)
}

fn solve_linear(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if b.len() != n {
        bail!("rhs length {} does not match matrix size {}", b.len(), n);
    }
    let inv = inverse(a).context("linear system is singular")?;
    Ok(inv.dot(b))
}

fn rank(a: &Array2<f64>) -> usize {
    rref(a).1.len()
}

/// Reduced row-echelon form with the pivot column indices.
fn rref(a: &Array2<f64>) -> (Array2<f64>, Vec<usize>) {
    let mut m = a.clone();
    let (nrows, ncols) = (m.nrows(), m.ncols());
    let mut pivots = Vec::new();
    let mut lead = 0;

    for row in 0..nrows {
        if lead >= ncols {
            break;
        }
        let mut pivot = row;
        while m[[pivot, lead]].abs() < RANK_TOLERANCE {
            pivot += 1;
            if pivot == nrows {
                pivot = row;
                lead += 1;
                if lead == ncols {
                    return (m, pivots);
                }
            }
        }
        if pivot != row {
            for k in 0..ncols {
                m.swap([row, k], [pivot, k]);
            }
        }
        let scale = m[[row, lead]];
        for k in 0..ncols {
            m[[row, k]] /= scale;
        }
        for other in 0..nrows {
            if other == row {
                continue;
            }
            let factor = m[[other, lead]];
            if factor.abs() < RANK_TOLERANCE {
                continue;
            }
            for k in 0..ncols {
                m[[other, k]] -= factor * m[[row, k]];
            }
        }
        pivots.push(lead);
        lead += 1;
    }

    (m, pivots)
}

fn is_symmetric(a: &Array2<f64>) -> bool {
    let n = a.nrows();
    for i in 0..n {
        for j in i + 1..n {
            if (a[[i, j]] - a[[j, i]]).abs() > 1e-10 {
                return false;
            }
        }
    }
    true
}

fn eigenvalues(a: &Array2<f64>) -> Result<(String, Value)> {
    let n = a.nrows();

    if n == 2 {
        // Closed form from the characteristic polynomial
        let trace = a[[0, 0]] + a[[1, 1]];
        let det = a[[0, 0]] * a[[1, 1]] - a[[0, 1]] * a[[1, 0]];
        let discriminant = trace * trace - 4.0 * det;
        if discriminant >= 0.0 {
            let sqrt_d = discriminant.sqrt();
            let l1 = (trace - sqrt_d) / 2.0;
            let l2 = (trace + sqrt_d) / 2.0;
            let display = format!(
                "Eigenvalues: $\\lambda = {}, {}$",
                format_sig(l1, 8),
                format_sig(l2, 8)
            );
            return Ok((display, json!([l1, l2])));
        }
        let re = trace / 2.0;
        let im = (-discriminant).sqrt() / 2.0;
        let display = format!(
            "Eigenvalues: $\\lambda = {} \\pm {}i$",
            format_sig(re, 8),
            format_sig(im, 8)
        );
        return Ok((display, json!({ "real": re, "imag": im })));
    }

    if !is_symmetric(a) {
        bail!("eigenvalues are supported for 2x2 and symmetric matrices only");
    }

    let values = jacobi_eigenvalues(a);
    let rendered = values
        .iter()
        .map(|v| format_sig(*v, 8))
        .collect::<Vec<_>>()
        .join(", ");
    Ok((
        format!("Eigenvalues: $\\lambda = {}$", rendered),
        json!(values),
    ))
}

/// Jacobi rotation method for symmetric matrices.
fn jacobi_eigenvalues(a: &Array2<f64>) -> Vec<f64> {
    let n = a.nrows();
    let mut m = a.clone();

    for _ in 0..100 {
        // Largest off-diagonal element
        let (mut p, mut q, mut largest) = (0, 1, 0.0_f64);
        for i in 0..n {
            for j in i + 1..n {
                if m[[i, j]].abs() > largest {
                    largest = m[[i, j]].abs();
                    p = i;
                    q = j;
                }
            }
        }
        if largest < 1e-12 {
            break;
        }

        let theta = 0.5 * (2.0 * m[[p, q]]).atan2(m[[p, p]] - m[[q, q]]);
        let (s, c) = theta.sin_cos();

        for k in 0..n {
            let mkp = m[[k, p]];
            let mkq = m[[k, q]];
            m[[k, p]] = c * mkp + s * mkq;
            m[[k, q]] = -s * mkp + c * mkq;
        }
        for k in 0..n {
            let mpk = m[[p, k]];
            let mqk = m[[q, k]];
            m[[p, k]] = c * mpk + s * mqk;
            m[[q, k]] = -s * mpk + c * mqk;
        }
    }

    let mut values: Vec<f64> = m.diag().to_vec();
    values.sort_by(|x, y| x.total_cmp(y));
    values
}
