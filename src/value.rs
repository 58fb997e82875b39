//! Scalar or vector magnitudes.
//!
//! Every magnitude in this crate is either a single finite real or a
//! one-dimensional sequence of reals. Binary operations broadcast a scalar
//! against a vector and reject vectors of differing length.

use crate::registry::AffineMap;
use crate::{Error, Result};
use ndarray::Array1;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Array1<f64>),
}

impl Value {
    /// The sequence length, or `None` for a scalar.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Scalar(_) => None,
            Value::Vector(v) => Some(v.len()),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }

    pub fn same_shape(&self, other: &Value) -> bool {
        self.len() == other.len()
    }

    /// A zero of the same shape.
    pub fn zeros_like(&self) -> Value {
        match self {
            Value::Scalar(_) => Value::Scalar(0.0),
            Value::Vector(v) => Value::Vector(Array1::zeros(v.len())),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Scalar(x) => *x == 0.0,
            Value::Vector(v) => v.iter().all(|x| *x == 0.0),
        }
    }

    /// The scalar payload, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            Value::Vector(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> Result<f64> {
        match self {
            Value::Scalar(x) => {
                if index == 0 {
                    Ok(*x)
                } else {
                    Err(Error::IndexOutOfRange { index, len: 1 })
                }
            }
            Value::Vector(v) => v
                .get(index)
                .copied()
                .ok_or(Error::IndexOutOfRange { index, len: v.len() }),
        }
    }

    /// Iterate over the elements; a scalar yields itself once.
    pub fn iter(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            Value::Scalar(x) => Box::new(std::iter::once(*x)),
            Value::Vector(v) => Box::new(v.iter().copied()),
        }
    }

    /// The elements as a vector of the given length, broadcasting a scalar.
    pub fn broadcast(&self, len: usize) -> Result<Array1<f64>> {
        match self {
            Value::Scalar(x) => Ok(Array1::from_elem(len, *x)),
            Value::Vector(v) => {
                if v.len() == len {
                    Ok(v.clone())
                } else {
                    Err(Error::ShapeMismatch(format!(
                        "expected {len} elements but found {}",
                        v.len()
                    )))
                }
            }
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(f(*x)),
            Value::Vector(v) => Value::Vector(v.mapv(f)),
        }
    }

    /// Combine elementwise, broadcasting scalars. Vectors of unequal length
    /// are a shape mismatch.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(*a, *b))),
            (Value::Vector(a), Value::Scalar(b)) => Ok(Value::Vector(a.mapv(|x| f(x, *b)))),
            (Value::Scalar(a), Value::Vector(b)) => Ok(Value::Vector(b.mapv(|x| f(*a, x)))),
            (Value::Vector(a), Value::Vector(b)) => {
                if a.len() != b.len() {
                    return Err(Error::ShapeMismatch(format!(
                        "operands have {} and {} elements",
                        a.len(),
                        b.len()
                    )));
                }
                Ok(Value::Vector(
                    a.iter().zip(b.iter()).map(|(x, y)| f(*x, *y)).collect(),
                ))
            }
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn div(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a / b)
    }

    pub fn pow(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, f64::powf)
    }

    pub fn neg(&self) -> Value {
        self.map(|x| -x)
    }

    pub fn abs(&self) -> Value {
        self.map(f64::abs)
    }

    pub fn sqrt(&self) -> Value {
        self.map(f64::sqrt)
    }

    pub fn ln(&self) -> Value {
        self.map(f64::ln)
    }

    pub fn log10(&self) -> Value {
        self.map(f64::log10)
    }

    pub fn exp(&self) -> Value {
        self.map(f64::exp)
    }

    /// Apply an affine conversion to every element.
    pub fn convert(&self, map: AffineMap) -> Value {
        self.map(|x| map.apply(x))
    }

    /// Apply only the scale of an affine conversion.
    pub fn convert_scale(&self, map: AffineMap) -> Value {
        self.map(|x| map.apply_scale(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Value::Scalar(x as f64)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(Array1::from(v))
    }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Value::Vector(Array1::from(v.to_vec()))
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::Vector(Array1::from(v.to_vec()))
    }
}

impl From<Array1<f64>> for Value {
    fn from(v: Array1<f64>) -> Self {
        Value::Vector(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    fn test_broadcasting() {
        let a = Value::from(2.0);
        let b = Value::from(vec![1.0, 2.0, 3.0]);
        match a.mul(&b).unwrap() {
            Value::Vector(v) => assert_eq!(v, arr1(&[2.0, 4.0, 6.0])),
            Value::Scalar(_) => panic!("expected a vector"),
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Value::from(vec![1.0, 2.0]);
        let b = Value::from(vec![1.0, 2.0, 3.0]);
        assert!(matches!(a.add(&b), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_convert_scale_skips_offset() {
        let map = AffineMap {
            scale: 2.0,
            offset: 10.0,
        };
        let v = Value::from(3.0);
        assert_relative_eq!(v.convert(map).as_scalar().unwrap(), 16.0);
        assert_relative_eq!(v.convert_scale(map).as_scalar().unwrap(), 6.0);
    }

    #[test]
    fn test_index() {
        let v = Value::from(vec![1.0, 2.0]);
        assert_eq!(v.get(1).unwrap(), 2.0);
        assert!(matches!(v.get(2), Err(Error::IndexOutOfRange { .. })));
        let s = Value::from(5.0);
        assert_eq!(s.get(0).unwrap(), 5.0);
        assert!(matches!(s.get(1), Err(Error::IndexOutOfRange { .. })));
    }
}
