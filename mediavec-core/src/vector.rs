//! Embedding vectors as held by an index.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, Result};

/// An immutable embedding.
///
/// The components live behind an `Arc<[f32]>`, so successive generations of
/// a namespace share one allocation per entry.
///
/// ```
/// use mediavec_core::Vector;
///
/// let v = Vector::from(vec![3.0, 4.0]);
/// assert_eq!(v.dimension(), 2);
/// assert_eq!(v.norm(), 5.0);
/// assert!(v.check().is_ok());
///
/// assert!(Vector::from(vec![f32::NAN]).check().is_err());
/// ```
#[derive(Clone, PartialEq)]
pub struct Vector(Arc<[f32]>);

impl Vector {
    #[inline]
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Checks that the vector can be indexed or queried with: at least one
    /// component, and no NaN or infinity.
    pub fn check(&self) -> Result<()> {
        check_components(&self.0)
    }

    /// L2 norm.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// Same test as [`Vector::check`] on a borrowed slice.
pub(crate) fn check_components(data: &[f32]) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidArgument("empty vector not allowed".into()));
    }
    if let Some(i) = data.iter().position(|x| !x.is_finite()) {
        return Err(Error::InvalidArgument(format!(
            "vector component {} is not finite",
            i
        )));
    }
    Ok(())
}

impl Deref for Vector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl AsRef<[f32]> for Vector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self(data.into())
    }
}

impl From<&[f32]> for Vector {
    fn from(data: &[f32]) -> Self {
        Self(data.into())
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SHOWN: usize = 4;
        write!(f, "Vector[{}](", self.0.len())?;
        for (i, x) in self.0.iter().take(SHOWN).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", x)?;
        }
        if self.0.len() > SHOWN {
            f.write_str(", ..")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let a = Vector::from(vec![1.0, 2.0, 3.0]);
        let b = a.clone();
        assert!(std::ptr::eq(a.as_slice().as_ptr(), b.as_slice().as_ptr()));
        assert_eq!(b[2], 3.0);
    }

    #[test]
    fn test_check() {
        assert!(Vector::from(vec![0.5, -1.0]).check().is_ok());
        assert!(matches!(
            Vector::from(Vec::new()).check(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Vector::from(vec![0.5, f32::INFINITY]).check().is_err());
    }

    #[test]
    fn test_debug_is_short() {
        let v = Vector::from(vec![0.0; 512]);
        assert_eq!(format!("{:?}", v), "Vector[512](0, 0, 0, 0, ..)");
    }
}
