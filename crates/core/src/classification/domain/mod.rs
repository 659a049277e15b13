pub mod emotion_classifier;
pub mod softmax;
