//! Lock coordinator tests
