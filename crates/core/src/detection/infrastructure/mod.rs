pub mod replay_face_detector;
