use rust_decimal::Decimal;

use crate::models::round_price;
use crate::{BotError, Result};

/// A value of a series at a bar index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub price: Decimal,
    pub time: i64,
}

impl Point {
    pub fn new(price: Decimal, time: i64) -> Self {
        Self {
            price: round_price(price),
            time,
        }
    }
}

/// Straight line between two samples of one series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    start: Point,
    end: Point,
}

impl LineSegment {
    /// The end must come strictly after the start
    pub fn new(start: Point, end: Point) -> Result<Self> {
        if end.time <= start.time {
            return Err(BotError::InvalidArgument(format!(
                "segment end index {} is not after start index {}",
                end.time, start.time
            )));
        }
        Ok(Self { start, end })
    }

    /// Segment through the last two values of a series, at indices 1 and 2
    pub fn from_last_two(previous: Decimal, latest: Decimal) -> Self {
        Self {
            start: Point::new(previous, 1),
            end: Point::new(latest, 2),
        }
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    /// `self - other` at both ends; both segments must span the same indices
    fn differences(&self, other: &LineSegment) -> Result<(Decimal, Decimal)> {
        if self.start.time != other.start.time || self.end.time != other.end.time {
            return Err(BotError::InvalidArgument(
                "segments cover different bar indices".to_string(),
            ));
        }
        Ok((
            self.start.price - other.start.price,
            self.end.price - other.end.price,
        ))
    }

    /// Whether `self` crosses `other` between the two indices.
    ///
    /// The series must be apart at the start and then swap order or touch.
    pub fn intersects(&self, other: &LineSegment) -> Result<bool> {
        let (before, after) = self.differences(other)?;
        if before.is_zero() {
            return Ok(false);
        }
        Ok(after.is_zero() || before.is_sign_negative() != after.is_sign_negative())
    }

    /// Price where the two lines meet, if they are not parallel
    pub fn intersection_price(&self, other: &LineSegment) -> Result<Option<Decimal>> {
        let (before, after) = self.differences(other)?;
        let closing = before - after;
        if closing.is_zero() {
            return Ok(None);
        }
        let fraction = before / closing;
        let slope = self.end.price - self.start.price;
        Ok(Some(round_price(self.start.price + slope * fraction)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_segment_requires_increasing_time() {
        let a = Point::new(dec!(1.1), 2);
        let b = Point::new(dec!(1.2), 2);
        assert!(matches!(
            LineSegment::new(a, b),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(LineSegment::new(Point::new(dec!(1.1), 1), b).is_ok());
    }

    #[test]
    fn test_crossing_segments() {
        let rising = LineSegment::from_last_two(dec!(1.10), dec!(1.20));
        let falling = LineSegment::from_last_two(dec!(1.20), dec!(1.10));

        assert!(rising.intersects(&falling).unwrap());
        assert_eq!(rising.intersection_price(&falling).unwrap(), Some(dec!(1.15)));
    }

    #[test]
    fn test_touching_at_end_counts() {
        let a = LineSegment::from_last_two(dec!(1.10), dec!(1.15));
        let b = LineSegment::from_last_two(dec!(1.20), dec!(1.15));
        assert!(a.intersects(&b).unwrap());
        assert_eq!(a.intersection_price(&b).unwrap(), Some(dec!(1.15)));
    }

    #[test]
    fn test_touching_at_start_does_not_count() {
        let a = LineSegment::from_last_two(dec!(1.15), dec!(1.10));
        let b = LineSegment::from_last_two(dec!(1.15), dec!(1.20));
        assert!(!a.intersects(&b).unwrap());
    }

    #[test]
    fn test_flat_parallel_segments() {
        let a = LineSegment::from_last_two(dec!(1.10), dec!(1.10));
        let b = LineSegment::from_last_two(dec!(1.20), dec!(1.20));
        assert!(!a.intersects(&b).unwrap());
        assert_eq!(a.intersection_price(&b).unwrap(), None);
    }

    #[test]
    fn test_intersection_rounds_to_price_scale() {
        // meet one third of the way along
        let a = LineSegment::from_last_two(dec!(1.10000), dec!(1.10030));
        let b = LineSegment::from_last_two(dec!(1.10010), dec!(1.10010));
        assert_eq!(a.intersection_price(&b).unwrap(), Some(dec!(1.10010)));

        let c = LineSegment::from_last_two(dec!(1.00000), dec!(1.00001));
        let d = LineSegment::from_last_two(dec!(1.00001), dec!(0.99999));
        // 1.00000 + 0.00001 * (1/3) = 1.0000033.. -> 1.00000
        assert_eq!(c.intersection_price(&d).unwrap(), Some(dec!(1.00000)));
    }
}
