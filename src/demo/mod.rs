//! Example applications built on the relay
//!
//! A coordinates lookup service: one listener answers city queries over the
//! two-way queue, another accepts new coordinates over the one-way queue, and
//! a client drives both through the response broker.

pub mod coordinates;

pub use coordinates::{
    ClientError, CoordinateQuery, CoordinateQueryListener, CoordinateReply,
    CoordinateSubmissionListener, Coordinates, CoordinatesClient, CoordinatesRepository,
    QueryStatus, ONEWAY_QUEUE_PROPERTY, TWOWAYS_QUEUE_PROPERTY,
};
