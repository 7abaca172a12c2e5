//! 流式驱动演示
//!
//! 连接控制器，进入轨迹模式，发送一条两点小轨迹并等待完成。
//!
//! ```bash
//! cargo run --example stream_demo -- driver.toml
//! ```

use std::sync::Arc;

use moto_driver::{
    DriverConfig, DriverError, GroupWaypoint, MotoProfile, StreamEvent, Trajectory,
    TrajectoryPoint, TrajectoryStreamer,
};

fn main() -> Result<(), DriverError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "driver.toml".into());
    let config = DriverConfig::load(&config_path)?;
    let joint_names: Vec<String> = config.groups[0].joint_names.clone();
    let group_id = config.groups[0].id;

    let driver = TrajectoryStreamer::from_config(&config, Arc::new(MotoProfile))?;
    let events = driver.events();

    driver.enable()?;

    // 原地小幅往返：起点必须与机器人当前位置一致，先喂一次关节状态
    let home = vec![0.0; joint_names.len()];
    driver.update_joint_state(group_id, joint_names.clone(), home.clone())?;

    let mut target = home.clone();
    target[0] += 0.05;
    let traj = Trajectory::new(
        joint_names,
        vec![
            TrajectoryPoint::single(GroupWaypoint {
                group_id,
                positions: home,
                velocities: vec![0.0; target.len()],
                accelerations: Vec::new(),
                time_from_start: 0.0,
            }),
            TrajectoryPoint::single(GroupWaypoint {
                group_id,
                positions: target.clone(),
                velocities: vec![0.0; target.len()],
                accelerations: Vec::new(),
                time_from_start: 2.0,
            }),
        ],
    );
    driver.submit(&traj)?;

    for event in events.iter() {
        match event {
            StreamEvent::PointAcked { seq } => println!("point {seq} queued"),
            StreamEvent::TrajectoryComplete => {
                println!("trajectory complete");
                break;
            }
            StreamEvent::Aborted { reason } => {
                eprintln!("trajectory aborted: {reason}");
                break;
            }
            other => println!("event: {other:?}"),
        }
    }

    driver.disable()?;
    Ok(())
}
