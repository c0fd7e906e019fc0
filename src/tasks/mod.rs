pub(crate) mod consumers;
pub(crate) mod pending;
pub(crate) mod scheduler;

/// Inbound event queues, one per upstream topic, plus the deferred-grading
/// queues owned by this service.
pub(crate) const ANSWER_EVENTS_QUEUE: &str = "events:student-responses";
pub(crate) const LOW_CONFIDENCE_IMAGES_QUEUE: &str = "events:low-confidence-images";
pub(crate) const STUDENT_ID_IMAGES_QUEUE: &str = "events:student-id-images";
pub(crate) const CORRECTIONS_QUEUE: &str = "events:grading-corrections";
pub(crate) const EXAM_UPDATES_QUEUE: &str = "events:exam-updates";
pub(crate) const PENDING_GRADING_QUEUE: &str = "grading:pending";
pub(crate) const DEAD_LETTER_QUEUE: &str = "grading:dead-letter";
