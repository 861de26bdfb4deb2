pub mod approximate_priority_queue;

pub use approximate_priority_queue::ApproximatePriorityQueue;
