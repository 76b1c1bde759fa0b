// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
pub mod error;

pub mod config;

pub mod dotgraph;

pub mod opclass;

pub mod paths;

pub mod toggle;

pub mod waveform;

pub mod hdl;

pub mod names;

pub mod cache;

pub mod leakage;

pub mod features;

pub mod pipeline;
