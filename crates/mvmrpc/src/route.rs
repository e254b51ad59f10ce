//! # Routing
//!
//! Top-level dispatch from a wire command to its typed form. The
//! `message_type` picks the route before any field is decoded; an
//! unrecognized type is unroutable (recoverable), while a recognized type
//! with an unknown command id is malformed.

use crate::command::Command;
use crate::error::Error;
use crate::error::Result;
use crate::lifecycle;
use crate::lifecycle::DestroyApp;
use crate::lifecycle::DestroyIsolate;
use crate::lifecycle::GetAppWindows;
use crate::lifecycle::InitIsolate;
use crate::lifecycle::PauseApp;
use crate::lifecycle::ResumeApp;
use crate::lifecycle::StartApp;
use crate::lifecycle::AppPaused;
use crate::lifecycle::AppRequestPause;
use crate::lifecycle::AppRequestResume;
use crate::lifecycle::AppResumed;
use crate::lifecycle::IsolateDestroyed;
use crate::lifecycle::IsolateInitialized;
use crate::window;
use crate::window::Background;
use crate::window::Foreground;
use crate::window::NotifyBg;
use crate::window::NotifyFg;
use crate::wire::WireCommand;

/// Every request an application isolate can receive from the executive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsolateRequest {
    InitIsolate(InitIsolate),
    DestroyIsolate(DestroyIsolate),
    StartApp(StartApp),
    PauseApp(PauseApp),
    ResumeApp(ResumeApp),
    GetAppWindows(GetAppWindows),
    DestroyApp(DestroyApp),
    Foreground(Foreground),
    Background(Background),
}

impl IsolateRequest {
    /// Routes a decoded wire command to its typed request.
    pub fn from_wire(cmd: &WireCommand) -> Result<Self> {
        match cmd.message_type.as_str() {
            lifecycle::MVM_LIFECYCLE => match cmd.id.as_str() {
                InitIsolate::ID => Ok(Self::InitIsolate(InitIsolate::from_wire(cmd)?)),
                DestroyIsolate::ID => Ok(Self::DestroyIsolate(DestroyIsolate::from_wire(cmd)?)),
                StartApp::ID => Ok(Self::StartApp(StartApp::from_wire(cmd)?)),
                PauseApp::ID => Ok(Self::PauseApp(PauseApp::from_wire(cmd)?)),
                ResumeApp::ID => Ok(Self::ResumeApp(ResumeApp::from_wire(cmd)?)),
                GetAppWindows::ID => Ok(Self::GetAppWindows(GetAppWindows::from_wire(cmd)?)),
                DestroyApp::ID => Ok(Self::DestroyApp(DestroyApp::from_wire(cmd)?)),
                id => Err(Error::Malformed(format!("unknown lifecycle request '{}'", id))),
            },
            window::EXECUTIVE_WINDOW => match cmd.id.as_str() {
                Foreground::ID => Ok(Self::Foreground(Foreground::from_wire(cmd)?)),
                Background::ID => Ok(Self::Background(Background::from_wire(cmd)?)),
                id => Err(Error::Malformed(format!("unknown window request '{}'", id))),
            },
            ty => Err(Error::Unroutable(ty.to_string())),
        }
    }
}

/// Every notification the executive can receive from an application isolate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutiveNotice {
    AppRequestPause(AppRequestPause),
    AppRequestResume(AppRequestResume),
    AppPaused(AppPaused),
    AppResumed(AppResumed),
    IsolateInitialized(IsolateInitialized),
    IsolateDestroyed(IsolateDestroyed),
    NotifyFg(NotifyFg),
    NotifyBg(NotifyBg),
}

impl ExecutiveNotice {
    /// Routes a decoded wire command to its typed notification.
    pub fn from_wire(cmd: &WireCommand) -> Result<Self> {
        match cmd.message_type.as_str() {
            lifecycle::ISOLATE_LIFECYCLE => match cmd.id.as_str() {
                AppRequestPause::ID => Ok(Self::AppRequestPause(AppRequestPause::from_wire(cmd)?)),
                AppRequestResume::ID => {
                    Ok(Self::AppRequestResume(AppRequestResume::from_wire(cmd)?))
                }
                AppPaused::ID => Ok(Self::AppPaused(AppPaused::from_wire(cmd)?)),
                AppResumed::ID => Ok(Self::AppResumed(AppResumed::from_wire(cmd)?)),
                IsolateInitialized::ID => {
                    Ok(Self::IsolateInitialized(IsolateInitialized::from_wire(cmd)?))
                }
                IsolateDestroyed::ID => {
                    Ok(Self::IsolateDestroyed(IsolateDestroyed::from_wire(cmd)?))
                }
                id => Err(Error::Malformed(format!("unknown lifecycle notification '{}'", id))),
            },
            window::EXECUTIVE_WINDOW => match cmd.id.as_str() {
                NotifyFg::ID => Ok(Self::NotifyFg(NotifyFg::from_wire(cmd)?)),
                NotifyBg::ID => Ok(Self::NotifyBg(NotifyBg::from_wire(cmd)?)),
                id => Err(Error::Malformed(format!("unknown window notification '{}'", id))),
            },
            ty => Err(Error::Unroutable(ty.to_string())),
        }
    }
}
