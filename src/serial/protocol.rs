//! The pad firmware's line protocol.
//!
//! Every line the device prints starts with a single-letter tag:
//!
//! ```text
//! v 12 0 3 1019 0 0 7 2      (sensor values)
//! t 1000 1000 900 1000 ...   (thresholds)
//! ```
//!
//! Anything else is diagnostic output.

use std::fmt::Display;

use crate::error::Error;

/// A line read from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLine {
    /// Raw sensor readings, in device order.
    Values(Vec<u16>),

    /// The thresholds the device currently uses, in device order.
    Thresholds(Vec<u16>),

    /// Anything we could not make sense of.
    Unrecognized(String),
}

impl DeviceLine {
    /// Parse a line (without its delimiter).
    /// The number of readings must match `sensor_count` exactly.
    pub fn parse(line: &str, sensor_count: usize) -> Self {
        let mut parts = line.split_whitespace();

        let numbers = |parts: std::str::SplitWhitespace| -> Option<Vec<u16>> {
            let numbers = parts
                .map(|part| part.parse::<u16>().ok())
                .collect::<Option<Vec<_>>>()?;

            (numbers.len() == sensor_count).then_some(numbers)
        };

        let parsed = match parts.next() {
            Some("v") => numbers(parts).map(Self::Values),
            Some("t") => numbers(parts).map(Self::Thresholds),
            _ => None,
        };

        parsed.unwrap_or_else(|| Self::Unrecognized(line.to_owned()))
    }
}

impl Display for DeviceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceLine::Values(values) => write!(f, "values: {values:?}"),
            DeviceLine::Thresholds(thresholds) => write!(f, "thresholds: {thresholds:?}"),
            DeviceLine::Unrecognized(line) => write!(f, "unrecognized: {line}"),
        }
    }
}

/// The wiring between the order sensors are presented in
/// and the order the device numbers them.
///
/// `order[logical] == device`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorOrder(Vec<usize>);

impl SensorOrder {
    /// Create from a permutation of `0..order.len()`.
    pub fn new(order: Vec<usize>) -> Result<Self, Error> {
        let mut seen = vec![false; order.len()];

        for &index in &order {
            match seen.get_mut(index) {
                Some(seen) if !*seen => *seen = true,
                _ => {
                    return Err(Error::BadConfig(format!(
                        "Sensor order {order:?} is not a permutation"
                    )))
                }
            }
        }

        Ok(Self(order))
    }

    /// The identity order for the given amount of sensors.
    #[cfg(test)]
    pub fn identity(count: usize) -> Self {
        Self((0..count).collect())
    }

    /// The number of sensors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Which device sensor a logical index refers to.
    pub fn device_index(&self, logical: usize) -> Option<usize> {
        self.0.get(logical).copied()
    }

    /// Rearrange readings from device order into logical order.
    /// Returns `None` if the amount of readings is off.
    pub fn reorder(&self, device: &[u16]) -> Option<Vec<u16>> {
        if device.len() != self.0.len() {
            return None;
        }

        Some(self.0.iter().map(|&index| device[index]).collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn values() {
        assert_eq!(
            DeviceLine::parse("v 1 2 3 4", 4),
            DeviceLine::Values(vec![1, 2, 3, 4])
        );
    }

    #[test]
    fn thresholds_with_extra_whitespace() {
        assert_eq!(
            DeviceLine::parse("t  1000 900\t1000 1000 ", 4),
            DeviceLine::Thresholds(vec![1000, 900, 1000, 1000])
        );
    }

    #[test]
    fn wrong_count_is_unrecognized() {
        assert_eq!(
            DeviceLine::parse("v 1 2 3", 4),
            DeviceLine::Unrecognized("v 1 2 3".into())
        );
        assert_eq!(
            DeviceLine::parse("t 1 2 3 4 5", 4),
            DeviceLine::Unrecognized("t 1 2 3 4 5".into())
        );
    }

    #[test]
    fn junk_is_unrecognized() {
        for line in ["", "hello", "v 1 2 x 4", "t -1 2 3 4", "x 1 2 3 4", "V 1 2 3 4"] {
            assert_eq!(
                DeviceLine::parse(line, 4),
                DeviceLine::Unrecognized(line.into()),
                "{line}"
            );
        }
    }

    #[test]
    fn reorder() {
        let order = SensorOrder::new(vec![2, 0, 1]).unwrap();

        assert_eq!(order.reorder(&[10, 20, 30]), Some(vec![30, 10, 20]));
        assert_eq!(order.device_index(0), Some(2));
        assert_eq!(order.device_index(3), None);
        assert_eq!(order.reorder(&[10, 20]), None);
    }

    #[test]
    fn identity() {
        let order = SensorOrder::identity(4);

        assert_eq!(order.reorder(&[1, 2, 3, 4]), Some(vec![1, 2, 3, 4]));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn not_a_permutation() {
        assert!(SensorOrder::new(vec![0, 0, 1]).is_err());
        assert!(SensorOrder::new(vec![0, 3, 1]).is_err());
    }
}
