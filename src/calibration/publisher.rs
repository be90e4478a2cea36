//! Computes and holds the published camera-to-screen transform.

use crate::geometry::{Quad, Transform, TransformError};

/// Result of one successful calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishedCalibration {
    /// Camera to screen.
    pub transform: Transform,
    /// Accepted board quad in camera space.
    pub board_bounds: Quad,
    /// Screen quad the board was mapped onto.
    pub screen_points: Quad,
}

/// Owns the screen reference quad and the current publication, if any.
#[derive(Debug, Clone)]
pub struct TransformPublisher {
    screen_points: Quad,
    published: Option<PublishedCalibration>,
    publish_count: u64,
}

impl TransformPublisher {
    pub fn new(screen_points: Quad) -> Self {
        Self {
            screen_points,
            published: None,
            publish_count: 0,
        }
    }

    /// Compute the homography from `board_bounds` to the screen quad and
    /// publish it. On error nothing is published.
    pub fn publish(&mut self, board_bounds: Quad) -> Result<&PublishedCalibration, TransformError> {
        let transform = Transform::from_quads(&board_bounds, &self.screen_points)?;
        self.publish_count += 1;
        Ok(&*self.published.insert(PublishedCalibration {
            transform,
            board_bounds,
            screen_points: self.screen_points,
        }))
    }

    pub fn withdraw(&mut self) {
        self.published = None;
    }

    pub fn current(&self) -> Option<&PublishedCalibration> {
        self.published.as_ref()
    }

    /// Number of transforms computed over the publisher's lifetime.
    pub fn publish_count(&self) -> u64 {
        self.publish_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use approx::assert_relative_eq;

    #[test]
    fn test_publish_and_withdraw() {
        let screen = Quad::from_rect(100.0, 100.0, 800.0, 500.0);
        let mut publisher = TransformPublisher::new(screen);
        let camera = Quad::from_rect(10.0, 20.0, 160.0, 100.0);

        let published = *publisher.publish(camera).unwrap();
        assert_eq!(published.board_bounds, camera);
        let mapped = published.transform.apply(Point::new(10.0, 20.0)).unwrap();
        assert_relative_eq!(mapped.x, 100.0, epsilon = 1e-6);
        assert_relative_eq!(mapped.y, 100.0, epsilon = 1e-6);
        assert_eq!(publisher.publish_count(), 1);

        publisher.withdraw();
        assert!(publisher.current().is_none());
    }

    #[test]
    fn test_degenerate_quad_is_not_published() {
        let mut publisher = TransformPublisher::new(Quad::from_rect(0.0, 0.0, 10.0, 10.0));
        let p = Point::new(5.0, 5.0);
        assert!(publisher.publish(Quad::new([p, p, p, p])).is_err());
        assert!(publisher.current().is_none());
        assert_eq!(publisher.publish_count(), 0);
    }
}
