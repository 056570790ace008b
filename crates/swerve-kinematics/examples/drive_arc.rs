use swerve_kinematics::*;

fn main() {
    let half_track = 0.3;
    let kinematics_result = SwerveKinematics::new([
        Translation::new(half_track, half_track),
        Translation::new(half_track, -half_track),
        Translation::new(-half_track, half_track),
        Translation::new(-half_track, -half_track),
    ]);

    let mut current_pose = Pose::new(0.0, 0.0, 0.0);
    let command = ChassisSpeeds::new(1.0, 0.5, 1.0); // 1 m/s forward, 0.5 m/s left, 1 rad/s turning
    let dt = 0.02; // Control period in seconds
    let num_steps = 10;

    match kinematics_result {
        Ok(kinematics) => {
            println!("Initializing simulation...");
            println!("  {}", kinematics);
            println!("  Command:        {}", command);
            println!("  Time Step:      {} s", dt);
            println!("  Num Steps:      {}", num_steps);

            let corrected = match command.discretize(dt) {
                Ok(speeds) => speeds,
                Err(e) => {
                    eprintln!("Failed to discretize command: {:?}", e);
                    return;
                }
            };
            println!("  Discretized:    {}", corrected);

            let mut distances = [0.0; MODULE_COUNT];
            println!("\nSimulating...");

            for i in 0..num_steps {
                let states = kinematics.to_module_states(corrected);
                let deltas = states.map(|s| ModulePosition::new(s.speed.abs() * dt, if s.speed < 0.0 { s.angle + core::f64::consts::PI } else { s.angle }));
                for (total, delta) in distances.iter_mut().zip(&deltas) {
                    *total += delta.distance;
                }
                current_pose = current_pose.exp(kinematics.to_twist(&deltas));
                println!("Step {:>2}: Pose: {}  FL: {}", i + 1, current_pose, states[0]);
            }

            println!("\nSimulation complete.");
            println!("Final Pose: {:?}", current_pose);
            println!("Odometers:  {:?}", distances);
        }
        Err(e) => {
            eprintln!("Failed to initialize kinematics: {:?}", e);
        }
    }
}
