//! Keyframe animation: clips, channels and the mixer that plays them.
//!
//! A clip is a set of channels. Each channel animates one property of one
//! node, identified by the node's index in the file it was loaded from. The
//! [`AnimationMixer`] advances its actions and writes the sampled values back
//! into a scene graph with [`AnimationMixer::apply`].

use std::collections::HashMap;

use cgmath::{InnerSpace, Quaternion, Vector3};

use crate::data_structures::scene_graph::{SceneNode, traverse_mut};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Values are stored as `[in tangent, value, out tangent]` per keyframe.
    CubicSpline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    Translation,
    Rotation,
    Scale,
    MorphWeights,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    /// Source index of the animated node.
    pub target: usize,
    pub property: Property,
    pub interpolation: Interpolation,
    pub times: Vec<f32>,
    /// Flattened keyframe values.
    pub values: Vec<f32>,
}

impl Channel {
    pub fn new(
        target: usize,
        property: Property,
        interpolation: Interpolation,
        times: Vec<f32>,
        values: Vec<f32>,
    ) -> Self {
        Self {
            target,
            property,
            interpolation,
            times,
            values,
        }
    }

    /// Number of floats per sampled value.
    pub fn components(&self) -> usize {
        match self.property {
            Property::Translation | Property::Scale => 3,
            Property::Rotation => 4,
            Property::MorphWeights => {
                let per_key = match self.interpolation {
                    Interpolation::CubicSpline => 3,
                    _ => 1,
                };
                let keys = self.times.len() * per_key;
                if keys == 0 { 0 } else { self.values.len() / keys }
            }
        }
    }

    pub fn duration(&self) -> f32 {
        self.times.last().copied().unwrap_or(0.0)
    }

    fn value(&self, key: usize) -> &[f32] {
        let n = self.components();
        let stride = match self.interpolation {
            Interpolation::CubicSpline => 3 * n,
            _ => n,
        };
        let offset = match self.interpolation {
            Interpolation::CubicSpline => key * stride + n,
            _ => key * stride,
        };
        self.values.get(offset..offset + n).unwrap_or(&[])
    }

    fn tangent(&self, key: usize, out: bool) -> &[f32] {
        let n = self.components();
        let offset = key * 3 * n + if out { 2 * n } else { 0 };
        self.values.get(offset..offset + n).unwrap_or(&[])
    }

    /// Value at time `t`, clamped to the first and last keyframe.
    pub fn sample(&self, t: f32) -> Vec<f32> {
        let n = self.components();
        if self.times.is_empty() || n == 0 {
            return Vec::new();
        }
        let last = self.times.len() - 1;
        if t <= self.times[0] {
            return self.value(0).to_vec();
        }
        if t >= self.times[last] {
            return self.value(last).to_vec();
        }
        // first keyframe strictly after t
        let next = self.times.partition_point(|&time| time <= t);
        let prev = next - 1;
        let (t0, t1) = (self.times[prev], self.times[next]);
        let dt = t1 - t0;
        let s = if dt > 0.0 { (t - t0) / dt } else { 0.0 };

        let sampled: Vec<f32> = match self.interpolation {
            Interpolation::Step => self.value(prev).to_vec(),
            Interpolation::Linear if self.property == Property::Rotation => {
                let a = to_quaternion(self.value(prev));
                let b = to_quaternion(self.value(next));
                from_quaternion(a.slerp(b, s).normalize())
            }
            Interpolation::Linear => self
                .value(prev)
                .iter()
                .zip(self.value(next))
                .map(|(a, b)| a + (b - a) * s)
                .collect(),
            Interpolation::CubicSpline => {
                let s2 = s * s;
                let s3 = s2 * s;
                let v0 = self.value(prev);
                let b0 = self.tangent(prev, true);
                let v1 = self.value(next);
                let a1 = self.tangent(next, false);
                (0..n)
                    .map(|i| {
                        (2.0 * s3 - 3.0 * s2 + 1.0) * v0[i]
                            + (s3 - 2.0 * s2 + s) * dt * b0[i]
                            + (-2.0 * s3 + 3.0 * s2) * v1[i]
                            + (s3 - s2) * dt * a1[i]
                    })
                    .collect()
            }
        };

        if self.property == Property::Rotation && sampled.len() == 4 {
            from_quaternion(to_quaternion(&sampled).normalize())
        } else {
            sampled
        }
    }
}

// glTF stores quaternions as [x, y, z, w]
fn to_quaternion(v: &[f32]) -> Quaternion<f32> {
    match v {
        [x, y, z, w] => Quaternion::new(*w, *x, *y, *z),
        _ => Quaternion::new(1.0, 0.0, 0.0, 0.0),
    }
}

fn from_quaternion(q: Quaternion<f32>) -> Vec<f32> {
    vec![q.v.x, q.v.y, q.v.z, q.s]
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<Channel>,
    pub duration: f32,
}

impl AnimationClip {
    pub fn new(name: &str, channels: Vec<Channel>) -> Self {
        let duration = channels.iter().map(Channel::duration).fold(0.0, f32::max);
        Self {
            name: name.to_string(),
            channels,
            duration,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    Once,
    #[default]
    Repeat,
}

/// Playback state of one clip inside a mixer.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationAction {
    clip: usize,
    pub time: f32,
    pub time_scale: f32,
    pub loop_mode: LoopMode,
    pub paused: bool,
    enabled: bool,
}

impl AnimationAction {
    fn new(clip: usize) -> Self {
        Self {
            clip,
            time: 0.0,
            time_scale: 1.0,
            loop_mode: LoopMode::Repeat,
            paused: false,
            enabled: false,
        }
    }

    pub fn play(&mut self) -> &mut Self {
        self.enabled = true;
        self
    }

    /// Stop and rewind.
    pub fn stop(&mut self) -> &mut Self {
        self.enabled = false;
        self.reset()
    }

    pub fn reset(&mut self) -> &mut Self {
        self.time = 0.0;
        self.paused = false;
        self
    }

    pub fn set_effective_time_scale(&mut self, time_scale: f32) -> &mut Self {
        self.time_scale = time_scale;
        self
    }

    pub fn set_loop(&mut self, loop_mode: LoopMode) -> &mut Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn is_running(&self) -> bool {
        self.enabled && !self.paused
    }

    fn advance(&mut self, dt: f32, duration: f32) {
        if !self.is_running() {
            return;
        }
        self.time += dt * self.time_scale;
        if duration <= 0.0 {
            self.time = 0.0;
            return;
        }
        match self.loop_mode {
            LoopMode::Repeat => self.time = self.time.rem_euclid(duration),
            LoopMode::Once => {
                if self.time >= duration || self.time < 0.0 {
                    self.time = self.time.clamp(0.0, duration);
                    self.enabled = false;
                }
            }
        }
    }
}

/// Plays clips on one scene graph. Each clip has exactly one action.
#[derive(Clone, Debug)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    actions: Vec<AnimationAction>,
    /// Global speed factor applied on top of each action's own time scale.
    pub time_scale: f32,
}

impl AnimationMixer {
    pub fn new(clips: Vec<AnimationClip>) -> Self {
        let actions = (0..clips.len()).map(AnimationAction::new).collect();
        Self {
            clips,
            actions,
            time_scale: 1.0,
        }
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    pub fn clip_action(&mut self, name: &str) -> Option<&mut AnimationAction> {
        let idx = self.clips.iter().position(|clip| clip.name == name)?;
        self.actions.get_mut(idx)
    }

    pub fn action(&self, name: &str) -> Option<&AnimationAction> {
        let idx = self.clips.iter().position(|clip| clip.name == name)?;
        self.actions.get(idx)
    }

    pub fn actions_mut(&mut self) -> impl Iterator<Item = &mut AnimationAction> {
        self.actions.iter_mut()
    }

    pub fn is_playing(&self) -> bool {
        self.actions.iter().any(AnimationAction::is_running)
    }

    /// Advance every running action by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        let dt = dt * self.time_scale;
        for action in self.actions.iter_mut() {
            let duration = self.clips[action.clip].duration;
            action.advance(dt, duration);
        }
    }

    pub fn stop_all_action(&mut self) {
        self.actions.iter_mut().for_each(|action| {
            action.stop();
        });
    }

    /// Sampled values of every enabled action keyed by target node. Later
    /// actions override earlier ones on the same property.
    pub fn sample(&self) -> HashMap<usize, Vec<(Property, Vec<f32>)>> {
        let mut targets: HashMap<usize, Vec<(Property, Vec<f32>)>> = HashMap::new();
        for action in self.actions.iter().filter(|action| action.enabled) {
            for channel in &self.clips[action.clip].channels {
                let value = channel.sample(action.time);
                if value.is_empty() {
                    continue;
                }
                let entry = targets.entry(channel.target).or_default();
                entry.retain(|(property, _)| *property != channel.property);
                entry.push((channel.property, value));
            }
        }
        targets
    }

    /// Write the current pose into the nodes below `root`.
    pub fn apply(&self, root: &mut dyn SceneNode) {
        let targets = self.sample();
        if targets.is_empty() {
            return;
        }
        traverse_mut(root, &mut |node| {
            let Some(values) = node.source_index().and_then(|idx| targets.get(&idx)) else {
                return;
            };
            for (property, value) in values {
                match property {
                    Property::Translation => {
                        node.local_transform_mut().position =
                            Vector3::new(value[0], value[1], value[2]);
                    }
                    Property::Scale => {
                        node.local_transform_mut().scale = Vector3::new(value[0], value[1], value[2]);
                    }
                    Property::Rotation => {
                        node.local_transform_mut().rotation = to_quaternion(value);
                    }
                    Property::MorphWeights => {
                        if let Some(model) = node.as_model_mut() {
                            for (influence, weight) in
                                model.morph_target_influences.iter_mut().zip(value)
                            {
                                *influence = *weight;
                            }
                        }
                    }
                }
            }
        });
    }
}
