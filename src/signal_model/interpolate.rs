/// Piecewise linear interpolation with zero fill outside the sampled range
///
/// Arguments
/// -----------------
/// * `xs`: sample abscissae, sorted in increasing order
/// * `ys`: sample values, same length as `xs`
/// * `x_new`: points to evaluate
///
/// Return
/// ----------
/// * One value per point of `x_new`; points outside `[xs[0], xs[n-1]]` (or NaN) yield `0.0`
pub fn linear_interpolate(xs: &[f64], ys: &[f64], x_new: &[f64]) -> Vec<f64> {
    let n = xs.len().min(ys.len());
    x_new
        .iter()
        .map(|&x| {
            if n == 0 || !(x >= xs[0] && x <= xs[n - 1]) {
                return 0.0;
            }
            // first sample strictly after x
            let j = xs[..n].partition_point(|&v| v <= x);
            if j == n {
                return ys[n - 1];
            }
            let i = j - 1;
            let t = (x - xs[i]) / (xs[j] - xs[i]);
            ys[i] + t * (ys[j] - ys[i])
        })
        .collect()
}
