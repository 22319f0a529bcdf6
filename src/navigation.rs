//! View routing
//!
//! One base view is active at a time, with at most one overlay layered on
//! top. The incident detail view owns the incident it shows, so a detail
//! screen without a selection cannot be constructed.

use tracing::debug;

use crate::models::Incident;

/// The seven base screens, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewTag {
    Dashboard,
    SubmitReport,
    IncidentDetail,
    AllIncidents,
    WorkSchedule,
    ColleagueDirectory,
    AccountSettings,
}

impl ViewTag {
    pub const ALL: [Self; 7] = [
        Self::Dashboard,
        Self::SubmitReport,
        Self::IncidentDetail,
        Self::AllIncidents,
        Self::WorkSchedule,
        Self::ColleagueDirectory,
        Self::AccountSettings,
    ];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::SubmitReport => "Report an Issue",
            Self::IncidentDetail => "Incident Details",
            Self::AllIncidents => "All Incidents",
            Self::WorkSchedule => "Work Schedule",
            Self::ColleagueDirectory => "Colleague Directory",
            Self::AccountSettings => "Account Settings",
        }
    }
}

/// Active base screen
#[derive(Debug, Clone, Default, PartialEq)]
pub enum View {
    #[default]
    Dashboard,
    SubmitReport,
    IncidentDetail(Box<Incident>),
    AllIncidents,
    WorkSchedule,
    ColleagueDirectory,
    AccountSettings,
}

impl View {
    #[must_use]
    pub const fn tag(&self) -> ViewTag {
        match self {
            Self::Dashboard => ViewTag::Dashboard,
            Self::SubmitReport => ViewTag::SubmitReport,
            Self::IncidentDetail(_) => ViewTag::IncidentDetail,
            Self::AllIncidents => ViewTag::AllIncidents,
            Self::WorkSchedule => ViewTag::WorkSchedule,
            Self::ColleagueDirectory => ViewTag::ColleagueDirectory,
            Self::AccountSettings => ViewTag::AccountSettings,
        }
    }

    #[must_use]
    pub fn selected_incident(&self) -> Option<&Incident> {
        match self {
            Self::IncidentDetail(incident) => Some(incident),
            _ => None,
        }
    }
}

/// Messaging layer above the base view; inbox and compose are exclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Overlay {
    #[default]
    Hidden,
    Inbox,
    Compose,
}

impl Overlay {
    #[must_use]
    pub const fn inbox_visible(self) -> bool {
        matches!(self, Self::Inbox)
    }

    #[must_use]
    pub const fn compose_visible(self) -> bool {
        matches!(self, Self::Compose)
    }
}

/// Navigation requests raised by screens and the navigation bar
#[derive(Debug, Clone, PartialEq)]
pub enum Nav {
    ReportNewIssue,
    SelectIncident(Incident),
    ViewAllIncidents,
    Back,
    OpenMessaging,
    CloseMessaging,
    ComposeNew,
    CloseCompose,
    OpenWorkSchedule,
    OpenColleagueDirectory,
    OpenAccountSettings,
    /// A newer copy of an incident arrived; refresh the detail view if it shows it
    IncidentUpdated(Incident),
}

/// State of a signed-in shell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shell {
    pub view: View,
    pub overlay: Overlay,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RouterState {
    #[default]
    SignedOut,
    SignedIn(Shell),
}

/// What to draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame<'a> {
    Login,
    App { view: &'a View, overlay: Overlay },
}

/// The root state machine
#[derive(Debug, Clone, Default)]
pub struct Router {
    state: RouterState,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> &RouterState {
        &self.state
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.state, RouterState::SignedIn(_))
    }

    /// Enter the app on the dashboard with no overlay
    pub fn login(&mut self) {
        debug!("Router: signed in");
        self.state = RouterState::SignedIn(Shell::default());
    }

    /// Drop every piece of view state and show the login screen
    pub fn logout(&mut self) {
        debug!("Router: signed out");
        self.state = RouterState::SignedOut;
    }

    /// Apply one navigation request. Returns false when signed out, where
    /// nothing but login is reachable.
    pub fn apply(&mut self, nav: Nav) -> bool {
        let RouterState::SignedIn(shell) = &mut self.state else {
            debug!(?nav, "Ignoring navigation while signed out");
            return false;
        };

        match nav {
            Nav::ReportNewIssue => shell.view = View::SubmitReport,
            Nav::SelectIncident(incident) => shell.view = View::IncidentDetail(Box::new(incident)),
            Nav::ViewAllIncidents => shell.view = View::AllIncidents,
            Nav::Back => shell.view = View::Dashboard,
            Nav::OpenWorkSchedule => shell.view = View::WorkSchedule,
            Nav::OpenColleagueDirectory => shell.view = View::ColleagueDirectory,
            Nav::OpenAccountSettings => shell.view = View::AccountSettings,
            Nav::OpenMessaging => shell.overlay = Overlay::Inbox,
            Nav::ComposeNew => shell.overlay = Overlay::Compose,
            Nav::CloseMessaging => {
                if shell.overlay == Overlay::Inbox {
                    shell.overlay = Overlay::Hidden;
                }
            },
            Nav::CloseCompose => {
                if shell.overlay == Overlay::Compose {
                    shell.overlay = Overlay::Hidden;
                }
            },
            Nav::IncidentUpdated(updated) => {
                if let View::IncidentDetail(current) = &mut shell.view {
                    if current.id == updated.id {
                        **current = updated;
                    }
                }
            },
        }
        debug!(view = ?shell.view.tag(), overlay = ?shell.overlay, "Router transition");
        true
    }

    #[must_use]
    pub fn view_tag(&self) -> Option<ViewTag> {
        match &self.state {
            RouterState::SignedIn(shell) => Some(shell.view.tag()),
            RouterState::SignedOut => None,
        }
    }

    #[must_use]
    pub fn overlay(&self) -> Overlay {
        match &self.state {
            RouterState::SignedIn(shell) => shell.overlay,
            RouterState::SignedOut => Overlay::Hidden,
        }
    }

    #[must_use]
    pub fn selected_incident(&self) -> Option<&Incident> {
        match &self.state {
            RouterState::SignedIn(shell) => shell.view.selected_incident(),
            RouterState::SignedOut => None,
        }
    }

    #[must_use]
    pub fn render(&self) -> Frame<'_> {
        match &self.state {
            RouterState::SignedOut => Frame::Login,
            RouterState::SignedIn(shell) => Frame::App { view: &shell.view, overlay: shell.overlay },
        }
    }
}
