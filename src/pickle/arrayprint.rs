//! numpy's default array `repr`: elements padded to a common width, floats in
//! `maxprec` mode with precision 8, summaries above 1000 elements and lines
//! wrapped at 75 columns.

use super::ndarray::{DTypeKind, NdArray, Scalar};

const SUMMARY_THRESHOLD: usize = 1000;
const EDGE_ITEMS: usize = 3;
const LINE_WIDTH: usize = 75;
const PRECISION: usize = 8;
const PREFIX: &str = "array(";

/// `repr(arr)` as numpy prints it.
pub(crate) fn array_repr(arr: &NdArray) -> String {
    let implied = matches!(
        arr.dtype().kind,
        DTypeKind::Float64 | DTypeKind::Int64 | DTypeKind::Bool
    );
    let show_dtype = !implied || arr.is_empty();
    let suffix = if show_dtype { "," } else { ")" };

    let body = if arr.is_empty() {
        if arr.shape() == [0] {
            "[]".to_string()
        } else {
            format!("[], shape={}", shape_repr(arr.shape()))
        }
    } else {
        let summarize = arr.len() > SUMMARY_THRESHOLD;
        let mut shown = Vec::new();
        collect_shown(arr.shape(), 0, 0, summarize, &mut shown);
        let values: Vec<Scalar> = shown.iter().filter_map(|&i| arr.get(i)).collect();
        let printer = Printer {
            arr,
            format: ElementFormat::new(arr.dtype().kind, &values, arr.ndim() == 0),
            summarize,
        };
        let indent = " ".repeat(PREFIX.len() + 1);
        printer.recurse(0, 0, &indent, LINE_WIDTH - suffix.len())
    };

    let mut out = format!("{PREFIX}{body}{suffix}");
    if show_dtype {
        let dtype = format!("dtype={})", arr.dtype().name());
        let last_line = out.len() - out.rfind('\n').map_or(0, |i| i + 1);
        if last_line + dtype.len() + 1 > LINE_WIDTH {
            out.push('\n');
            out.push_str(&" ".repeat(PREFIX.len()));
        } else {
            out.push(' ');
        }
        out.push_str(&dtype);
    }
    out
}

fn shape_repr(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    }
}

/// Indices along one axis; `None` marks the `...` of a summary.
fn positions(dim: usize, summarize: bool) -> Vec<Option<usize>> {
    if summarize && dim > 2 * EDGE_ITEMS {
        (0..EDGE_ITEMS)
            .map(Some)
            .chain(std::iter::once(None))
            .chain((dim - EDGE_ITEMS..dim).map(Some))
            .collect()
    } else {
        (0..dim).map(Some).collect()
    }
}

fn stride(shape: &[usize], axis: usize) -> usize {
    shape[axis + 1..].iter().product()
}

/// Flat C-order indices of every element the repr will show.
fn collect_shown(shape: &[usize], base: usize, axis: usize, summarize: bool, out: &mut Vec<usize>) {
    if axis == shape.len() {
        out.push(base);
        return;
    }
    let step = stride(shape, axis);
    for i in positions(shape[axis], summarize).into_iter().flatten() {
        collect_shown(shape, base + i * step, axis + 1, summarize, out);
    }
}

struct Printer<'a> {
    arr: &'a NdArray,
    format: ElementFormat,
    summarize: bool,
}

impl Printer<'_> {
    fn recurse(&self, base: usize, axis: usize, indent: &str, width: usize) -> String {
        let shape = self.arr.shape();
        if axis == shape.len() {
            return self.arr.get(base).map_or_else(String::new, |s| self.format.render(s));
        }
        let next_indent = format!("{indent} ");
        let next_width = width.saturating_sub(1);
        let step = stride(shape, axis);
        let positions = positions(shape[axis], self.summarize);
        let last = positions.len().saturating_sub(1);
        let axes_left = shape.len() - axis;

        let mut s = String::new();
        if axes_left == 1 {
            let elem_width = width.saturating_sub(1);
            let mut line = indent.to_string();
            for (n, pos) in positions.iter().enumerate() {
                let word = match pos {
                    None => "...".to_string(),
                    Some(i) => self.recurse(base + i * step, axis + 1, &next_indent, next_width),
                };
                extend_line(&mut s, &mut line, &word, elem_width, indent);
                if n != last {
                    line.push_str(", ");
                }
            }
            s.push_str(&line);
        } else {
            let line_sep = format!(",{}", "\n".repeat(axes_left - 1));
            for (n, pos) in positions.iter().enumerate() {
                s.push_str(indent);
                match pos {
                    None => s.push_str("..."),
                    Some(i) => {
                        let sub = self.recurse(base + i * step, axis + 1, &next_indent, next_width);
                        s.push_str(&sub);
                    }
                }
                if n != last {
                    s.push_str(&line_sep);
                }
            }
        }
        format!("[{}]", &s[indent.len()..])
    }
}

fn extend_line(s: &mut String, line: &mut String, word: &str, width: usize, indent: &str) {
    // Wrapping a line that holds only the indent would not help.
    let needs_wrap = line.len() + word.len() > width && line.len() > indent.len();
    if needs_wrap {
        s.push_str(line.trim_end());
        s.push('\n');
        *line = indent.to_string();
    }
    line.push_str(word);
}

// ---------------------------------------------------------------------------
// Element formats
// ---------------------------------------------------------------------------

enum ElementFormat {
    Bool { pad_true: bool },
    Int { width: usize },
    Float(FloatFormat),
}

impl ElementFormat {
    fn new(kind: DTypeKind, values: &[Scalar], zero_dim: bool) -> Self {
        match kind {
            DTypeKind::Bool => ElementFormat::Bool { pad_true: !zero_dim },
            DTypeKind::Float32 | DTypeKind::Float64 => {
                let floats: Vec<f64> = values.iter().map(|s| s.as_f64()).collect();
                ElementFormat::Float(FloatFormat::new(&floats, kind == DTypeKind::Float32))
            }
            _ => ElementFormat::Int {
                width: values
                    .iter()
                    .map(|s| int_text(*s).len())
                    .max()
                    .unwrap_or(0),
            },
        }
    }

    fn render(&self, value: Scalar) -> String {
        match self {
            ElementFormat::Bool { pad_true } => match (value.as_f64() != 0.0, pad_true) {
                (true, true) => " True".to_string(),
                (true, false) => "True".to_string(),
                (false, _) => "False".to_string(),
            },
            ElementFormat::Int { width } => format!("{:>width$}", int_text(value), width = *width),
            ElementFormat::Float(format) => format.render(value.as_f64()),
        }
    }
}

fn int_text(value: Scalar) -> String {
    match value {
        Scalar::Bool(b) => u8::from(b).to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::UInt(u) => u.to_string(),
        Scalar::Float(v) => v.to_string(),
    }
}

/// numpy `FloatingFormat` in `maxprec` mode.
struct FloatFormat {
    single: bool,
    exponential: bool,
    /// Fraction digits in exponential mode.
    precision: usize,
    pad_left: usize,
    pad_right: usize,
    exp_size: usize,
}

impl FloatFormat {
    fn new(values: &[f64], single: bool) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let magnitudes: Vec<f64> = finite.iter().filter(|v| **v != 0.0).map(|v| v.abs()).collect();
        let exponential = if magnitudes.is_empty() {
            false
        } else {
            let max = magnitudes.iter().copied().fold(f64::MIN, f64::max);
            let min = magnitudes.iter().copied().fold(f64::MAX, f64::min);
            max >= 1e8 || min < 1e-4 || max / min > 1000.0
        };

        let mut format = FloatFormat {
            single,
            exponential,
            precision: 0,
            pad_left: 0,
            pad_right: 0,
            exp_size: 0,
        };
        if finite.is_empty() {
            // only nan/inf: widths come from the non-finite fix-up below
        } else if exponential {
            let parts: Vec<Scientific> = finite.iter().map(|&v| scientific(v, single)).collect();
            format.precision = parts.iter().map(|p| p.frac.len()).max().unwrap_or(0);
            format.pad_left = parts.iter().map(|p| p.int.len()).max().unwrap_or(0);
            format.exp_size = parts
                .iter()
                .map(|p| p.exp.unsigned_abs().to_string().len().max(2))
                .max()
                .unwrap_or(2);
            format.pad_right = format.exp_size + 2 + format.precision;
        } else {
            let parts: Vec<(String, String)> =
                finite.iter().map(|&v| positional(v, single)).collect();
            format.pad_left = parts.iter().map(|(i, _)| i.len()).max().unwrap_or(0);
            format.pad_right = parts.iter().map(|(_, f)| f.len()).max().unwrap_or(0);
        }

        if finite.len() != values.len() {
            let neg_inf = values.iter().any(|v| *v == f64::NEG_INFINITY);
            let offset = format.pad_right + 1;
            let nan_pad = 3usize.saturating_sub(offset);
            let inf_pad = (3 + usize::from(neg_inf)).saturating_sub(offset);
            format.pad_left = format.pad_left.max(nan_pad).max(inf_pad);
        }
        format
    }

    fn render(&self, v: f64) -> String {
        let (pad_left, pad_right) = (self.pad_left, self.pad_right);
        if !v.is_finite() {
            let text = if v.is_nan() {
                "nan"
            } else if v > 0.0 {
                "inf"
            } else {
                "-inf"
            };
            let total = pad_left + pad_right + 1;
            return format!("{text:>total$}");
        }
        if self.exponential {
            let Scientific { int, frac, exp } = scientific(v, self.single);
            let sign = if exp < 0 { '-' } else { '+' };
            let (precision, exp_size) = (self.precision, self.exp_size);
            format!(
                "{int:>pad_left$}.{frac:0<precision$}e{sign}{:0>exp_size$}",
                exp.unsigned_abs()
            )
        } else {
            let (int, frac) = positional(v, self.single);
            format!("{int:>pad_left$}.{frac:<pad_right$}")
        }
    }
}

/// Shortest round-trip digits, cut to `PRECISION` fraction digits, trailing
/// zeros dropped: `(integer part with sign, fraction)`.
fn positional(v: f64, single: bool) -> (String, String) {
    let shortest = if single {
        format!("{}", v as f32)
    } else {
        format!("{v}")
    };
    let frac_len = shortest.split_once('.').map_or(0, |(_, f)| f.len());
    let text = if frac_len <= PRECISION {
        shortest
    } else if single {
        format!("{:.*}", PRECISION, v as f32)
    } else {
        format!("{:.*}", PRECISION, v)
    };
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
    (int.to_string(), frac.trim_end_matches('0').to_string())
}

struct Scientific {
    int: String,
    frac: String,
    exp: i32,
}

fn scientific(v: f64, single: bool) -> Scientific {
    let shortest = if single {
        format!("{:e}", v as f32)
    } else {
        format!("{v:e}")
    };
    let split = |text: &str| -> (String, String, i32) {
        let (mantissa, exp) = text.split_once('e').unwrap_or((text, "0"));
        let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        (
            int.to_string(),
            frac.trim_end_matches('0').to_string(),
            exp.parse().unwrap_or(0),
        )
    };
    let (mut int, mut frac, mut exp) = split(&shortest);
    if frac.len() > PRECISION {
        let rounded = if single {
            format!("{:.*e}", PRECISION, v as f32)
        } else {
            format!("{:.*e}", PRECISION, v)
        };
        (int, frac, exp) = split(&rounded);
    }
    Scientific { int, frac, exp }
}

/// Python `repr(float)`: shortest round-trip digits, exponent notation when
/// the decimal exponent is below -4 or at least 16.
pub(crate) fn py_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return (if v > 0.0 { "inf" } else { "-inf" }).to_string();
    }
    let Scientific { int, frac, exp } = scientific(v, false);
    if (-4..16).contains(&exp) {
        let text = format!("{v}");
        if text.contains('.') {
            text
        } else {
            format!("{text}.0")
        }
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        let mantissa = if frac.is_empty() {
            int
        } else {
            format!("{int}.{frac}")
        };
        format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pickle::DType;

    fn f32_array(shape: Vec<usize>, values: &[f32]) -> NdArray {
        NdArray::from_f32(shape, values).unwrap()
    }

    fn f64_array(values: &[f64]) -> NdArray {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        NdArray::new(
            vec![values.len()],
            DType::new(DTypeKind::Float64),
            data,
        )
        .unwrap()
    }

    #[test]
    fn integers_share_a_width() {
        let arr = NdArray::new(
            vec![2],
            DType::new(DTypeKind::Int16),
            vec![0x01, 0x00, 0xff, 0xff],
        )
        .unwrap();
        assert_eq!(array_repr(&arr), "array([ 1, -1], dtype=int16)");
    }

    #[test]
    fn floats_pad_to_the_widest_fraction() {
        let arr = f32_array(vec![4], &[0.0, 0.5, 1.0, 0.25]);
        assert_eq!(
            array_repr(&arr),
            "array([0.  , 0.5 , 1.  , 0.25], dtype=float32)"
        );
    }

    #[test]
    fn floats_keep_at_most_eight_digits() {
        assert_eq!(array_repr(&f64_array(&[0.1 + 0.2])), "array([0.3])");
        assert_eq!(array_repr(&f64_array(&[1.0 / 3.0])), "array([0.33333333])");
        assert_eq!(array_repr(&f64_array(&[-1.5, 2.0])), "array([-1.5,  2. ])");
    }

    #[test]
    fn wide_ranges_switch_to_exponent() {
        assert_eq!(
            array_repr(&f64_array(&[1e-5, 1e5])),
            "array([1.e-05, 1.e+05])"
        );
        assert_eq!(
            array_repr(&f64_array(&[1.5e-5, 2.0])),
            "array([1.5e-05, 2.0e+00])"
        );
    }

    #[test]
    fn non_finite_values_align() {
        assert_eq!(
            array_repr(&f64_array(&[f64::NAN, 1.0, f64::NEG_INFINITY])),
            "array([ nan,   1., -inf])"
        );
    }

    #[test]
    fn long_rows_wrap_at_75_columns() {
        let values: Vec<f64> = (0..30).map(f64::from).collect();
        let text = array_repr(&f64_array(&values));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "array([ 0.,  1.,  2.,  3.,  4.,  5.,  6.,  7.,  8.,  9., 10., 11., 12.,"
        );
        assert!(lines[1].starts_with("       13., 14.,"));
        assert!(lines.iter().all(|l| l.len() <= LINE_WIDTH));
        assert!(text.ends_with("29.])"));
    }

    #[test]
    fn bools_pad_true() {
        let arr = NdArray::new(
            vec![2],
            DType::new(DTypeKind::Bool),
            vec![1, 0],
        )
        .unwrap();
        assert_eq!(array_repr(&arr), "array([ True, False])");
    }

    #[test]
    fn python_float_repr() {
        assert_eq!(py_float(1e16), "1e+16");
        assert_eq!(py_float(1e-5), "1e-05");
        assert_eq!(py_float(1.5e-7), "1.5e-07");
        assert_eq!(py_float(1e15), "1000000000000000.0");
        assert_eq!(py_float(0.0001), "0.0001");
        assert_eq!(py_float(-2.0), "-2.0");
        assert_eq!(py_float(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(py_float(f64::INFINITY), "inf");
    }
}
