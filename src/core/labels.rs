//! Class label tables for the five cascade stages.
//!
//! Index order matches the output order of the trained models.

/// Branch stage output 0.
pub const DYNAMIC: &str = "Dynamic";
/// Branch stage output 1.
pub const STATIC: &str = "Static";

pub const ASCENDING_STAIRS: &str = "Ascending Stairs";
pub const DESCENDING_STAIRS: &str = "Descending Stairs";
pub const NORMAL_WALKING: &str = "Normal Walking";
pub const RUNNING: &str = "Running";
pub const SHUFFLE_WALKING: &str = "Shuffle Walking";
pub const MISC_MOVEMENT: &str = "Miscellaneous Movement";

pub const LYING_BACK: &str = "Lying Down on Back";
pub const LYING_LEFT: &str = "Lying Down on Left";
pub const LYING_RIGHT: &str = "Lying Down on Right";
pub const LYING_STOMACH: &str = "Lying Down on Stomach";
/// Combined class the static model cannot split on its own.
pub const SITTING_STANDING: &str = "Sitting/Standing";

pub const SITTING: &str = "Sitting";
pub const STANDING: &str = "Standing";

pub const NORMAL_BREATHING: &str = "Normal";
pub const COUGHING: &str = "Coughing";
pub const HYPERVENTILATION: &str = "Hyperventilation";
pub const OTHER_RESPIRATORY: &str = "Other";

/// Activities whose accelerometer signature drowns out breathing.
pub const HIGH_MOTION: [&str; 6] = [
    ASCENDING_STAIRS,
    DESCENDING_STAIRS,
    NORMAL_WALKING,
    RUNNING,
    SHUFFLE_WALKING,
    MISC_MOVEMENT,
];

/// Activities during which respiratory inference is skipped.
pub fn is_high_motion(label: &str) -> bool {
    HIGH_MOTION.contains(&label)
}

fn owned(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|l| l.to_string()).collect()
}

/// Class order of the branch classifier.
pub fn branch_labels() -> Vec<String> {
    owned(&[DYNAMIC, STATIC])
}

/// Class order of the dynamic specialist.
pub fn dynamic_labels() -> Vec<String> {
    owned(&HIGH_MOTION)
}

/// Class order of the static specialist.
pub fn static_labels() -> Vec<String> {
    owned(&[
        LYING_BACK,
        LYING_LEFT,
        LYING_RIGHT,
        LYING_STOMACH,
        SITTING_STANDING,
    ])
}

/// Class order of the secondary-source classifier.
pub fn secondary_aux_labels() -> Vec<String> {
    owned(&[SITTING, STANDING])
}

/// Class order of the respiratory classifier.
pub fn respiratory_labels() -> Vec<String> {
    owned(&[NORMAL_BREATHING, COUGHING, HYPERVENTILATION, OTHER_RESPIRATORY])
}
